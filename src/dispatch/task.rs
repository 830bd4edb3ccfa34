//! Download tasks built from resolved metadata.

use std::fmt;
use std::path::PathBuf;

use super::filename::{FallbackName, is_single_path_segment};
use crate::config::Endpoints;
use crate::layout::OutputLayout;
use crate::metadata::{CoverDescriptor, MediaDescriptor};

/// One binary to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Title the binary belongs to.
    pub title_id: String,
    /// Human-readable identity used in logs (`cover c1`, `update T1`).
    pub label: String,
    /// Fully built fetch URL.
    pub url: String,
    /// Directory the file is written into; created on demand.
    pub dest_dir: PathBuf,
    /// Name used when the server does not send `Content-Disposition`.
    pub fallback: FallbackName,
}

/// A metadata entry missing an identifying field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Title the entry belongs to.
    pub title_id: String,
    /// Which kind of entry and what it was missing.
    pub reason: SkipReason,
}

/// Why an entry cannot be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Cover without `CoverID`.
    MissingCoverId,
    /// Update whose media has no `MediaID`.
    MissingMediaId,
    /// Update whose `MediaID` is not a single directory name (`..`, `/abs`, `a/b`).
    UnsafeMediaId,
    /// Update without `TitleUpdateID`.
    MissingTitleUpdateId,
    /// Update without a usable `Version`.
    MissingVersion,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingCoverId => "cover entry without CoverID",
            Self::MissingMediaId => "update entry without MediaID",
            Self::UnsafeMediaId => "update entry whose MediaID is not a plain directory name",
            Self::MissingTitleUpdateId => "update entry without TitleUpdateID",
            Self::MissingVersion => "update entry without Version",
        })
    }
}

/// A dispatcher work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedTask {
    /// Fetch and write a file.
    Download(DownloadTask),
    /// Log and count as success.
    Skip(SkippedEntry),
}

impl PlannedTask {
    fn skip(title_id: &str, reason: SkipReason) -> Self {
        Self::Skip(SkippedEntry {
            title_id: title_id.to_string(),
            reason,
        })
    }
}

/// One task per cover, in listing order.
#[must_use]
pub fn cover_tasks(
    title_id: &str,
    covers: &[CoverDescriptor],
    endpoints: &Endpoints,
    layout: &OutputLayout,
) -> Vec<PlannedTask> {
    covers
        .iter()
        .map(|cover| match cover.cover_id.as_deref() {
            Some(cover_id) => PlannedTask::Download(DownloadTask {
                title_id: title_id.to_string(),
                label: format!("cover {cover_id}"),
                url: endpoints.cover_fetch_url(cover_id),
                dest_dir: layout.covers_dir(title_id),
                fallback: FallbackName::Cover {
                    cover_id: cover_id.to_string(),
                },
            }),
            None => PlannedTask::skip(title_id, SkipReason::MissingCoverId),
        })
        .collect()
}

/// One task per (media, update) pair, media-major.
#[must_use]
pub fn update_tasks(
    title_id: &str,
    media: &[MediaDescriptor],
    endpoints: &Endpoints,
    layout: &OutputLayout,
) -> Vec<PlannedTask> {
    media
        .iter()
        .flat_map(|entry| {
            entry.updates.iter().map(move |update| {
                let Some(media_id) = entry.media_id.as_deref() else {
                    return PlannedTask::skip(title_id, SkipReason::MissingMediaId);
                };
                if !is_single_path_segment(media_id) {
                    return PlannedTask::skip(title_id, SkipReason::UnsafeMediaId);
                }
                let Some(tuid) = update.title_update_id.as_deref() else {
                    return PlannedTask::skip(title_id, SkipReason::MissingTitleUpdateId);
                };
                let Some(version) = update.version else {
                    return PlannedTask::skip(title_id, SkipReason::MissingVersion);
                };
                PlannedTask::Download(DownloadTask {
                    title_id: title_id.to_string(),
                    label: format!("update {tuid}"),
                    url: endpoints.update_fetch_url(tuid),
                    dest_dir: layout.update_dir(title_id, media_id, version),
                    fallback: FallbackName::Update {
                        title_update_id: tuid.to_string(),
                    },
                })
            })
        })
        .collect()
}
