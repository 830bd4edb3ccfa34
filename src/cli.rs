//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use unityscrape_core::config::{
    DEFAULT_BASE_URL, DEFAULT_MAX_WORKERS, DEFAULT_OUTPUT_ROOT, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use unityscrape_core::fetch::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_RETRIES,
};
use unityscrape_core::split_title_ids;

/// Download cover art and title updates for catalog title IDs.
///
/// Each title's metadata is saved as JSON next to the downloaded files under
/// the output root.
#[derive(Parser, Debug)]
#[command(name = "unityscrape")]
#[command(author, version, about)]
pub struct Args {
    /// Title IDs, separated by spaces or commas (e.g. 555308C5,00000155)
    #[arg(value_name = "TITLE_IDS")]
    pub title_ids: Vec<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory all output is written under
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_ROOT)]
    pub output_root: PathBuf,

    /// Attempts per request, including the first (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: u32,

    /// Exponential base of the delay between attempts
    #[arg(long, default_value_t = DEFAULT_BACKOFF_FACTOR)]
    pub backoff_factor: f64,

    /// Longest delay between attempts in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_BACKOFF_SECS)]
    pub max_backoff: f64,

    /// Concurrent downloads per title phase (1-64)
    #[arg(short = 'w', long, default_value_t = DEFAULT_MAX_WORKERS as u8, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub max_workers: u8,

    /// Per-request timeout in seconds
    #[arg(short = 't', long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub timeout: f64,

    /// Catalog host the four endpoints are built under
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

impl Args {
    /// Positional values split on commas, trimmed, empties dropped.
    #[must_use]
    pub fn normalized_title_ids(&self) -> Vec<String> {
        self.title_ids
            .iter()
            .flat_map(|raw| split_title_ids(raw))
            .collect()
    }

    /// Filter directive used when RUST_LOG is not set.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            self.log_level.as_str()
        }
    }
}

/// Accepted `--log-level` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
