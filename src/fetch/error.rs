//! Error types for the fetch module.
//!
//! Every variant carries the URL it belongs to so a single log line is enough
//! to tell which catalog request went wrong.

use thiserror::Error;

/// Reasons a single fetch attempt can fail.
///
/// Apart from [`FetchError::InvalidUrl`], all variants are retried by the
/// [`Fetcher`](super::Fetcher) until its attempt budget is spent.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, refused connection, reset, TLS).
    #[error("transport error fetching {url}: {source}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt did not complete within the request timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL being fetched.
        url: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL being fetched.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Reading a buffered response body failed after the headers arrived.
    #[error("error reading response body from {url}: {source}")]
    Body {
        /// The URL being fetched.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The URL is not an absolute URL; no request is ever sent.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL string.
        url: String,
    },
}

impl FetchError {
    /// Classifies a client error into timeout or transport.
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Transport {
                url: url.into(),
                source,
            }
        }
    }

    /// Classifies a body read error into timeout or body failure.
    pub fn from_body(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Body {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}
