//! Runtime configuration: retry budget, worker cap, timeouts, output root
//! and catalog endpoints.
//!
//! Every field has a compiled-in default. Embedding callers can build a
//! [`ScrapeConfig`] in code or deserialize one from JSON; missing fields keep
//! their defaults. Call [`ScrapeConfig::validate`] before use.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::fetch::{
    BackoffPolicy, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_RETRIES,
};

/// Default catalog host.
pub const DEFAULT_BASE_URL: &str = "http://xboxunity.net";

/// Default number of concurrent downloads inside one phase.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default per-attempt request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;

/// Default directory all output is written under.
pub const DEFAULT_OUTPUT_ROOT: &str = "unityscrape";

const MAX_RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10;
const MAX_WORKERS_RANGE: std::ops::RangeInclusive<usize> = 1..=64;
const MAX_REQUEST_TIMEOUT_SECS: f64 = 3600.0;

const COVER_INFO_PATH: &str = "/Resources/Lib/CoverInfo.php";
const COVER_FETCH_PATH: &str = "/Resources/Lib/Cover.php";
const UPDATE_INFO_PATH: &str = "/Resources/Lib/TitleUpdateInfo.php";
const UPDATE_FETCH_PATH: &str = "/Resources/Lib/TitleUpdate.php";

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `max_retries` outside the accepted range.
    #[error("invalid max_retries {0}: must be between 1 and 10")]
    MaxRetries(u32),

    /// `max_workers` outside the accepted range.
    #[error("invalid max_workers {0}: must be between 1 and 64")]
    MaxWorkers(usize),

    /// Backoff factor below 1 or not finite.
    #[error("invalid backoff_factor {0}: must be a finite number >= 1")]
    BackoffFactor(f64),

    /// Negative or non-finite backoff cap.
    #[error("invalid max_backoff_secs {0}: must be a finite number >= 0")]
    MaxBackoff(f64),

    /// Timeout not in (0, 3600].
    #[error("invalid request_timeout_secs {0}: must be greater than 0 and at most 3600")]
    RequestTimeout(f64),

    /// Empty output root.
    #[error("output_root must not be empty")]
    EmptyOutputRoot,

    /// Endpoint that is not an absolute http(s) URL.
    #[error("invalid {name} endpoint '{value}': expected an absolute http(s) URL")]
    Endpoint {
        /// Which endpoint.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// The four catalog endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Cover metadata, queried with `?titleid=`.
    pub cover_info: String,
    /// Cover image, queried with `?size=large&cid=`.
    pub cover_fetch: String,
    /// Title update metadata, queried with `?titleid=`.
    pub update_info: String,
    /// Title update binary, queried with `?tuid=`.
    pub update_fetch: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::with_base(DEFAULT_BASE_URL)
    }
}

impl Endpoints {
    /// Builds all four endpoints under `base` (scheme + host, optional prefix).
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            cover_info: format!("{base}{COVER_INFO_PATH}"),
            cover_fetch: format!("{base}{COVER_FETCH_PATH}"),
            update_info: format!("{base}{UPDATE_INFO_PATH}"),
            update_fetch: format!("{base}{UPDATE_FETCH_PATH}"),
        }
    }

    /// `<cover_info>?titleid=<id>`
    #[must_use]
    pub fn cover_info_url(&self, title_id: &str) -> String {
        with_query(&self.cover_info, &[("titleid", title_id)])
    }

    /// `<cover_fetch>?size=large&cid=<cover_id>`
    #[must_use]
    pub fn cover_fetch_url(&self, cover_id: &str) -> String {
        with_query(&self.cover_fetch, &[("size", "large"), ("cid", cover_id)])
    }

    /// `<update_info>?titleid=<id>`
    #[must_use]
    pub fn update_info_url(&self, title_id: &str) -> String {
        with_query(&self.update_info, &[("titleid", title_id)])
    }

    /// `<update_fetch>?tuid=<title_update_id>`
    #[must_use]
    pub fn update_fetch_url(&self, title_update_id: &str) -> String {
        with_query(&self.update_fetch, &[("tuid", title_update_id)])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("cover_info", &self.cover_info),
            ("cover_fetch", &self.cover_fetch),
            ("update_info", &self.update_info),
            ("update_fetch", &self.update_fetch),
        ] {
            let valid = Url::parse(value)
                .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host());
            if !valid {
                return Err(ConfigError::Endpoint {
                    name,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Appends percent-encoded query pairs to an endpoint.
///
/// Falls back to plain concatenation when the endpoint does not parse; the
/// fetcher then rejects the URL as invalid.
fn with_query(endpoint: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse(endpoint) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(pairs);
            url.into()
        }
        Err(_) => {
            let query: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect();
            format!("{endpoint}?{}", query.join("&"))
        }
    }
}

/// Tunables for a scrape run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Attempts per request, including the first.
    pub max_retries: u32,
    /// Exponential base of the backoff delay.
    pub backoff_factor: f64,
    /// Cap on a single backoff delay.
    pub max_backoff_secs: f64,
    /// Concurrent downloads inside one phase.
    pub max_workers: usize,
    /// Per-attempt request timeout.
    pub request_timeout_secs: f64,
    /// Directory all output is written under.
    pub output_root: PathBuf,
    /// Catalog endpoints.
    pub endpoints: Endpoints,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            max_workers: DEFAULT_MAX_WORKERS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            endpoints: Endpoints::default(),
        }
    }
}

impl ScrapeConfig {
    /// Checks every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(ConfigError::MaxRetries(self.max_retries));
        }
        if !MAX_WORKERS_RANGE.contains(&self.max_workers) {
            return Err(ConfigError::MaxWorkers(self.max_workers));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        if !self.max_backoff_secs.is_finite() || self.max_backoff_secs < 0.0 {
            return Err(ConfigError::MaxBackoff(self.max_backoff_secs));
        }
        if !self.request_timeout_secs.is_finite()
            || self.request_timeout_secs <= 0.0
            || self.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
        {
            return Err(ConfigError::RequestTimeout(self.request_timeout_secs));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputRoot);
        }
        self.endpoints.validate()
    }

    /// Backoff policy derived from the retry fields.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_retries,
            self.backoff_factor,
            Duration::try_from_secs_f64(self.max_backoff_secs).unwrap_or(Duration::ZERO),
        )
    }

    /// Per-attempt request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}
