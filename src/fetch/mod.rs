//! Retrying HTTP fetcher: the single point of contact with the catalog service.
//!
//! # Features
//!
//! - Bounded attempts with exponential backoff (`min(factor^(n-1), cap)`)
//! - Pluggable [`Sleeper`] so backoff can be tested without real delays
//! - Buffered mode for metadata, streaming mode for large binaries
//! - Failures reported as [`FetchOutcome::Exhausted`] values, never raised

mod backoff;
mod client;
mod error;

pub use backoff::{
    BackoffPolicy, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_RETRIES,
    RetryDecision, Sleeper, TokioSleeper,
};
pub use client::{BodyMode, FetchOutcome, FetchedResponse, Fetcher, ResponseBody, USER_AGENT};
pub use error::FetchError;
