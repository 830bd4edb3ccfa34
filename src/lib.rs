//! unityscrape core library
//!
//! Fetches cover art and title-update binaries for catalog title ids and
//! writes them, together with the raw metadata documents, into a
//! predictable directory tree.
//!
//! # Architecture
//!
//! Leaf first:
//! - [`fetch`] - retrying HTTP GET with exponential backoff
//! - [`metadata`] - cover and update listings, decoded and snapshotted
//! - [`dispatch`] - bounded-parallel binary downloads streamed to disk
//! - [`scrape`] - per-title covers-then-updates orchestration
//! - [`config`] and [`layout`] - tunables and on-disk paths
//!
//! The library never installs a tracing subscriber; callers choose where
//! log events go.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod layout;
pub mod metadata;
pub mod scrape;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, Endpoints, ScrapeConfig};
pub use dispatch::{DispatchReport, Dispatcher};
pub use fetch::{BackoffPolicy, BodyMode, FetchError, FetchOutcome, Fetcher, Sleeper};
pub use layout::OutputLayout;
pub use metadata::{MetadataKind, MetadataResolver, ResolveError};
pub use scrape::{
    NoopObserver, Phase, ScrapeObserver, ScrapeResult, Scraper, SetupError, normalize_title_ids,
    split_title_ids,
};
