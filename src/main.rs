//! CLI entry point for unityscrape.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use unityscrape_core::{
    Endpoints, Phase, ScrapeConfig, ScrapeObserver, ScrapeResult, Scraper, SetupError,
};

mod cli;

use cli::Args;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(2),
            ProcessExit::Failure => ExitCode::from(1),
        }
    }
}

/// Maps per-title results to the process exit outcome.
fn determine_exit_outcome(succeeded: usize, failed: usize, interrupted: bool) -> ProcessExit {
    if interrupted {
        ProcessExit::Failure
    } else if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

fn should_use_progress_bar(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn build_config(args: &Args) -> ScrapeConfig {
    ScrapeConfig {
        max_retries: args.max_retries,
        backoff_factor: args.backoff_factor,
        max_backoff_secs: args.max_backoff,
        max_workers: usize::from(args.max_workers),
        request_timeout_secs: args.timeout,
        output_root: args.output_root.clone(),
        endpoints: Endpoints::with_base(&args.base_url),
    }
}

/// Prints one line per finished title and drives the optional progress bar.
struct CliProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl CliProgress {
    fn new(total: usize, use_bar: bool, quiet: bool) -> Self {
        let bar = use_bar.then(|| {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self { bar, quiet }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ScrapeObserver for CliProgress {
    fn on_title_started(&mut self, index: usize, total: usize, title_id: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("[{}/{total}] {title_id}: covers", index + 1));
        }
    }

    fn on_phase_finished(&mut self, title_id: &str, phase: Phase, _ok: bool) {
        if let (Some(bar), Phase::Covers) = (&self.bar, phase) {
            bar.set_message(format!("{title_id}: updates"));
        }
    }

    fn on_title_finished(&mut self, _index: usize, _total: usize, result: &ScrapeResult) {
        let status = if result.succeeded() { "OK" } else { "FAILED" };
        let line = format!("{}  ->  {status}", result.title_id);
        match &self.bar {
            Some(bar) => {
                bar.println(line);
                bar.inc(1);
            }
            None if !self.quiet => println!("{line}"),
            None => {}
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > --log-level
    init_tracing(args.default_log_level());
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run(args: Args) -> Result<ProcessExit> {
    let title_ids = args.normalized_title_ids();
    if title_ids.is_empty() {
        println!("No valid Title IDs provided.");
        return Ok(ProcessExit::Success);
    }

    let scraper = match Scraper::new(build_config(&args)) {
        Ok(scraper) => scraper,
        Err(SetupError::Config(e)) => {
            eprintln!("Invalid configuration: {e}");
            return Ok(ProcessExit::Failure);
        }
        Err(e) => return Err(e).context("failed to start scraper"),
    };

    let interrupted = scraper.cancel_handle();
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    info!(count = title_ids.len(), "unityscrape starting");

    let use_bar = should_use_progress_bar(
        io::stderr().is_terminal(),
        args.quiet,
        is_dumb_terminal(),
    );
    let mut progress = CliProgress::new(title_ids.len(), use_bar, args.quiet);
    let failed = scraper
        .scrape_all_with_progress(&title_ids, &mut progress)
        .await;
    progress.finish();

    Ok(report(&title_ids, &failed, &interrupted))
}

fn report(title_ids: &[String], failed: &[String], interrupted: &AtomicBool) -> ProcessExit {
    let interrupted = interrupted.load(Ordering::SeqCst);
    if interrupted {
        warn!("Interrupted. Remaining Title IDs were not processed.");
    }

    if failed.is_empty() && !interrupted {
        println!("All Title IDs processed successfully.");
    } else if !failed.is_empty() {
        println!("The following Title IDs failed: {}", failed.join(", "));
    }

    determine_exit_outcome(title_ids.len() - failed.len(), failed.len(), interrupted)
}
