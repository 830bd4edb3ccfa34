//! Progress callbacks for multi-title runs.

use std::fmt;

/// The two phases of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Cover metadata and images.
    Covers,
    /// Update metadata and binaries.
    Updates,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Covers => "covers",
            Self::Updates => "updates",
        })
    }
}

/// Outcome of both phases for one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    /// The (trimmed) title id.
    pub title_id: String,
    /// Covers phase outcome.
    pub covers_ok: bool,
    /// Updates phase outcome.
    pub updates_ok: bool,
}

impl ScrapeResult {
    /// True when both phases succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.covers_ok && self.updates_ok
    }
}

/// Receives progress events from
/// [`Scraper::scrape_all_with_progress`](super::Scraper::scrape_all_with_progress).
///
/// `index` is zero-based; `total` counts the normalized ids.
pub trait ScrapeObserver {
    /// A title is about to be processed.
    fn on_title_started(&mut self, _index: usize, _total: usize, _title_id: &str) {}

    /// One phase of a title finished.
    fn on_phase_finished(&mut self, _title_id: &str, _phase: Phase, _ok: bool) {}

    /// Both phases of a title finished.
    fn on_title_finished(&mut self, _index: usize, _total: usize, _result: &ScrapeResult) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ScrapeObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_succeeds_only_when_both_phases_do() {
        let mut result = ScrapeResult {
            title_id: "A".to_string(),
            covers_ok: true,
            updates_ok: true,
        };
        assert!(result.succeeded());
        result.updates_ok = false;
        assert!(!result.succeeded());
        result.updates_ok = true;
        result.covers_ok = false;
        assert!(!result.succeeded());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Covers.to_string(), "covers");
        assert_eq!(Phase::Updates.to_string(), "updates");
    }
}
