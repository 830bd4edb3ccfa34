//! Retrying HTTP GET wrapper shared by the resolver and the dispatcher.
//!
//! The [`Fetcher`] is the only type in the crate that talks to the network.
//! It is cheap to clone: clones share the underlying connection pool.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::backoff::{BackoffPolicy, RetryDecision, Sleeper, TokioSleeper};
use super::error::FetchError;

/// User-Agent sent with every catalog request.
pub const USER_AGENT: &str = concat!("unityscrape/", env!("CARGO_PKG_VERSION"));

/// How the response body should be handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Read the whole body inside the attempt (metadata documents).
    Buffered,
    /// Return as soon as headers arrive; the caller drains the body (binaries).
    Streaming,
}

/// Body of a successful response.
#[derive(Debug)]
pub enum ResponseBody {
    /// Fully read body.
    Buffered(Vec<u8>),
    /// Live response whose body has not been read yet.
    Streaming(reqwest::Response),
}

/// A 2xx response returned by [`Fetcher::fetch`].
#[derive(Debug)]
pub struct FetchedResponse {
    url: String,
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl FetchedResponse {
    /// The URL that was requested.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The response status (always 2xx).
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// All response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw `Content-Disposition` header, if present and valid text.
    #[must_use]
    pub fn content_disposition(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
    }

    /// The raw `Content-Type` header, if present and valid text.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Consumes the response and returns its body.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Consumes the response and returns the whole body, reading it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Body`] or [`FetchError::Timeout`] if a streaming
    /// body fails while being read.
    pub async fn into_bytes(self) -> Result<Vec<u8>, FetchError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(response) => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| FetchError::from_body(&self.url, e)),
        }
    }
}

/// Result of a fetch after the retry budget has been applied.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A 2xx response.
    Success(FetchedResponse),
    /// Every attempt failed; carries the last attempt's error.
    Exhausted {
        /// Attempts made (0 when the URL was rejected before sending).
        attempts: u32,
        /// Why the last attempt failed.
        last_error: FetchError,
    },
}

impl FetchOutcome {
    /// Returns true for [`FetchOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts into a `Result`, keeping the attempt count on failure.
    ///
    /// # Errors
    ///
    /// Returns `(last_error, attempts)` for [`FetchOutcome::Exhausted`].
    pub fn into_result(self) -> Result<FetchedResponse, (FetchError, u32)> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Exhausted {
                attempts,
                last_error,
            } => Err((last_error, attempts)),
        }
    }
}

/// HTTP GET with bounded retries and exponential backoff.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use unityscrape_core::fetch::{BackoffPolicy, BodyMode, FetchOutcome, Fetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = Fetcher::new(BackoffPolicy::default(), Duration::from_secs(10))?;
/// let outcome = fetcher
///     .fetch("http://xboxunity.net/Resources/Lib/CoverInfo.php?titleid=555308C5", BodyMode::Buffered, Duration::from_secs(10))
///     .await;
/// if let FetchOutcome::Success(response) = outcome {
///     println!("{} bytes", response.into_bytes().await?.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Fetcher {
    /// Builds a fetcher with its own connection pool.
    ///
    /// `io_timeout` bounds connecting and each individual body read; the
    /// per-call `timeout` of [`fetch`](Self::fetch) bounds the whole attempt
    /// up to the response headers (and the body in buffered mode).
    ///
    /// # Errors
    ///
    /// Returns the client builder error if the TLS backend cannot be initialized.
    pub fn new(policy: BackoffPolicy, io_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(io_timeout)
            .read_timeout(io_timeout)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self::with_client(client, policy))
    }

    /// Wraps an existing client (shares its connection pool).
    #[must_use]
    pub fn with_client(client: Client, policy: BackoffPolicy) -> Self {
        Self {
            client,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces how the fetcher waits between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Performs a GET with retries.
    ///
    /// Transport errors, timeouts, non-2xx statuses and (buffered mode) body
    /// read failures all count as failed attempts. After failed attempt `n`
    /// the fetcher waits `policy.delay_for(n)` unless the budget is spent.
    /// Failures are reported through [`FetchOutcome::Exhausted`], never raised.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, mode: BodyMode, timeout: Duration) -> FetchOutcome {
        if Url::parse(url).is_err() {
            let last_error = FetchError::invalid_url(url);
            error!(url = %url, error = %last_error, "refusing to fetch malformed URL");
            return FetchOutcome::Exhausted {
                attempts: 0,
                last_error,
            };
        }

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "sending request");

            let error = match self.attempt(url, mode, timeout).await {
                Ok(response) => {
                    debug!(attempt, status = response.status.as_u16(), "request succeeded");
                    return FetchOutcome::Success(response);
                }
                Err(error) => error,
            };

            match self.policy.after_failure(attempt) {
                RetryDecision::Retry { delay, .. } => {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "request failed; retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                RetryDecision::GiveUp { attempts } => {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts,
                        error = %error,
                        "request failed"
                    );
                    error!(url = %url, attempts, "exceeded retries");
                    return FetchOutcome::Exhausted {
                        attempts,
                        last_error: error,
                    };
                }
            }
        }
    }

    /// One attempt: send, check status, optionally read the body.
    async fn attempt(
        &self,
        url: &str,
        mode: BodyMode,
        timeout: Duration,
    ) -> Result<FetchedResponse, FetchError> {
        let deadline = tokio::time::Instant::now() + timeout;

        let response = tokio::time::timeout_at(deadline, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::timeout(url))?
            .map_err(|e| FetchError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let headers = response.headers().clone();
        let body = match mode {
            BodyMode::Streaming => ResponseBody::Streaming(response),
            BodyMode::Buffered => {
                let bytes = tokio::time::timeout_at(deadline, response.bytes())
                    .await
                    .map_err(|_| FetchError::timeout(url))?
                    .map_err(|e| FetchError::from_body(url, e))?;
                ResponseBody::Buffered(bytes.to_vec())
            }
        };

        Ok(FetchedResponse {
            url: url.to_string(),
            status,
            headers,
            body,
        })
    }
}
