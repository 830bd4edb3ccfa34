//! Retry budget and exponential backoff schedule for catalog requests.
//!
//! The [`BackoffPolicy`] decides how many attempts a request gets and how
//! long to wait after each failed one. Waiting goes through the [`Sleeper`]
//! trait so the schedule can be exercised without real delays.
//!
//! # Delay Calculation
//!
//! ```text
//! delay(n) = min(backoff_factor^(n-1), max_backoff) seconds
//! ```
//!
//! With the defaults (factor 2, cap 30s, 3 attempts) the waits are 1s, 2s, 4s.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use unityscrape_core::fetch::{BackoffPolicy, RetryDecision};
//!
//! let policy = BackoffPolicy::default();
//! assert_eq!(policy.delay_for(2), Duration::from_secs(2));
//! assert!(matches!(policy.after_failure(3), RetryDecision::GiveUp { .. }));
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Default number of attempts per request (including the first one).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default exponential base for the backoff delay.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Default cap on a single backoff delay, in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: f64 = 30.0;

/// What to do after an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt number `next_attempt`.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// The 1-indexed number of the next attempt.
        next_attempt: u32,
    },

    /// The attempt budget is spent.
    GiveUp {
        /// Total attempts made.
        attempts: u32,
    },
}

/// Attempt budget and exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (including the initial one).
    max_attempts: u32,
    /// Exponential base.
    factor: f64,
    /// Upper bound for one delay.
    max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: Duration::from_secs_f64(DEFAULT_MAX_BACKOFF_SECS),
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            factor,
            max_delay,
        }
    }

    /// Returns the configured attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the failed attempt `attempt` (1-indexed).
    ///
    /// Formula: `min(factor^(attempt-1), max_delay)` seconds.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = f64::from(attempt.saturating_sub(1));
        let raw_secs = self.factor.powf(exponent);
        let cap_secs = self.max_delay.as_secs_f64();
        let secs = if raw_secs.is_finite() {
            raw_secs.min(cap_secs)
        } else {
            cap_secs
        };
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(self.max_delay)
    }

    /// Decides whether attempt `attempt` (1-indexed, just failed) gets a successor.
    #[must_use]
    pub fn after_failure(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "attempt budget exhausted");
            return RetryDecision::GiveUp { attempts: attempt };
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempt),
            next_attempt: attempt + 1,
        }
    }
}

/// Waits between attempts.
///
/// Production code uses [`TokioSleeper`]; tests inject an implementation that
/// records the requested delays instead of sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Suspends the calling task for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
