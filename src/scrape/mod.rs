//! Per-title orchestration: covers phase, then updates phase, for each title
//! in input order.
//!
//! Titles run one after another; downloads inside a phase run in parallel on
//! the [`Dispatcher`]'s worker pool. Failures are reported as booleans and,
//! for multi-title runs, as the list of failed title ids.

mod observer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub use observer::{NoopObserver, Phase, ScrapeObserver, ScrapeResult};

use crate::config::{ConfigError, Endpoints, ScrapeConfig};
use crate::dispatch::{Dispatcher, cover_tasks, update_tasks};
use crate::fetch::Fetcher;
use crate::layout::OutputLayout;
use crate::metadata::MetadataResolver;

/// Errors building a [`Scraper`].
#[derive(Debug, Error)]
pub enum SetupError {
    /// The configuration did not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Trims each id and drops the empty ones, keeping input order.
#[must_use]
pub fn normalize_title_ids<S: AsRef<str>>(title_ids: &[S]) -> Vec<String> {
    title_ids
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits a comma-separated list (`"555308C5, 00000155"`) into normalized ids.
#[must_use]
pub fn split_title_ids(raw: &str) -> Vec<String> {
    normalize_title_ids(&raw.split(',').collect::<Vec<_>>())
}

/// Drives the resolver and the dispatcher for one or more titles.
#[derive(Debug, Clone)]
pub struct Scraper {
    resolver: MetadataResolver,
    dispatcher: Dispatcher,
    endpoints: Endpoints,
    layout: OutputLayout,
    cancel: Arc<AtomicBool>,
}

impl Scraper {
    /// Validates `config` and builds a scraper with its own HTTP client.
    ///
    /// # Errors
    ///
    /// [`SetupError::Config`] for invalid settings, [`SetupError::Client`]
    /// when the HTTP client cannot be built.
    pub fn new(config: ScrapeConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let fetcher = Fetcher::new(config.backoff_policy(), config.request_timeout())?;
        Self::with_fetcher(config, fetcher)
    }

    /// Validates `config` and builds a scraper around an existing fetcher.
    ///
    /// # Errors
    ///
    /// [`SetupError::Config`] for invalid settings.
    pub fn with_fetcher(config: ScrapeConfig, fetcher: Fetcher) -> Result<Self, SetupError> {
        config.validate()?;
        let timeout = config.request_timeout();
        let layout = OutputLayout::new(config.output_root.clone());
        info!(
            output_root = %layout.root().display(),
            max_workers = config.max_workers,
            max_retries = config.max_retries,
            "scraper ready"
        );
        Ok(Self {
            resolver: MetadataResolver::new(
                fetcher.clone(),
                config.endpoints.clone(),
                layout.clone(),
                timeout,
            ),
            dispatcher: Dispatcher::new(fetcher, config.max_workers, timeout),
            endpoints: config.endpoints,
            layout,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops [`scrape_all`](Self::scrape_all) before the next title.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// True once the cancel flag has been set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Resolves cover metadata and downloads every cover.
    ///
    /// True when the metadata resolved and every cover was written (or the
    /// title has none).
    #[instrument(skip(self))]
    pub async fn download_covers(&self, title_id: &str) -> bool {
        let covers = match self.resolver.resolve_covers(title_id).await {
            Ok(covers) => covers,
            Err(e) => {
                error!(title_id, error = %e, "cover metadata unavailable");
                return false;
            }
        };
        if covers.is_empty() {
            info!(title_id, "no covers found");
            return true;
        }
        info!(title_id, count = covers.len(), "downloading covers");
        let tasks = cover_tasks(title_id, &covers, &self.endpoints, &self.layout);
        self.dispatcher.run_all(tasks).await
    }

    /// Resolves update metadata and downloads every update binary.
    ///
    /// True when the metadata resolved and every update was written (or the
    /// title has none).
    #[instrument(skip(self))]
    pub async fn download_updates(&self, title_id: &str) -> bool {
        let media = match self.resolver.resolve_updates(title_id).await {
            Ok(media) => media,
            Err(e) => {
                error!(title_id, error = %e, "update metadata unavailable");
                return false;
            }
        };
        let tasks = update_tasks(title_id, &media, &self.endpoints, &self.layout);
        if tasks.is_empty() {
            info!(title_id, "no title updates found");
            return true;
        }
        info!(title_id, count = tasks.len(), "downloading title updates");
        self.dispatcher.run_all(tasks).await
    }

    /// Runs both phases for one title. The updates phase runs even when the
    /// covers phase failed.
    pub async fn scrape_title(&self, title_id: &str) -> ScrapeResult {
        let covers_ok = self.download_covers(title_id).await;
        let updates_ok = self.download_updates(title_id).await;
        ScrapeResult {
            title_id: title_id.to_string(),
            covers_ok,
            updates_ok,
        }
    }

    /// Scrapes every title in order and returns the ids that failed.
    pub async fn scrape_all<S: AsRef<str>>(&self, title_ids: &[S]) -> Vec<String> {
        self.scrape_all_with_progress(title_ids, &mut NoopObserver)
            .await
    }

    /// Like [`scrape_all`](Self::scrape_all), reporting progress to `observer`.
    ///
    /// Ids are trimmed and empty ones dropped. When the cancel flag is set no
    /// further title starts; titles that never started are not reported as
    /// failed.
    #[instrument(skip_all, fields(count = title_ids.len()))]
    pub async fn scrape_all_with_progress<S, O>(
        &self,
        title_ids: &[S],
        observer: &mut O,
    ) -> Vec<String>
    where
        S: AsRef<str>,
        O: ScrapeObserver + ?Sized,
    {
        let ids = normalize_title_ids(title_ids);
        let total = ids.len();
        let mut failed = Vec::new();

        for (index, title_id) in ids.iter().enumerate() {
            if self.is_cancelled() {
                warn!(remaining = total - index, "scrape cancelled");
                break;
            }

            info!(title_id = %title_id, index = index + 1, total, "processing title");
            observer.on_title_started(index, total, title_id);

            let covers_ok = self.download_covers(title_id).await;
            observer.on_phase_finished(title_id, Phase::Covers, covers_ok);
            let updates_ok = self.download_updates(title_id).await;
            observer.on_phase_finished(title_id, Phase::Updates, updates_ok);

            let result = ScrapeResult {
                title_id: title_id.clone(),
                covers_ok,
                updates_ok,
            };
            if result.succeeded() {
                info!(title_id = %title_id, "title completed");
            } else {
                warn!(title_id = %title_id, covers_ok, updates_ok, "title failed");
                failed.push(title_id.clone());
            }
            observer.on_title_finished(index, total, &result);
        }

        failed
    }
}
