//! Metadata resolution: one buffered fetch per (title, kind), JSON decoding,
//! and a best-effort snapshot of the document on disk.
//!
//! The snapshot is written only after the body parsed as JSON, so a malformed
//! response never leaves a `*_data.json` file behind.

mod error;
mod model;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::{debug, error, info, instrument};

pub use error::ResolveError;
pub use model::{
    CoverDescriptor, MediaDescriptor, UpdateDescriptor, covers_from_document,
    media_from_document,
};

use crate::config::Endpoints;
use crate::fetch::{BodyMode, FetchError, Fetcher};
use crate::layout::OutputLayout;

/// Which metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    /// Cover art listing.
    Covers,
    /// Title update listing.
    Updates,
}

impl MetadataKind {
    /// Lowercase name used in file names and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Covers => "covers",
            Self::Updates => "updates",
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves cover and update listings for title ids.
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    fetcher: Fetcher,
    endpoints: Endpoints,
    layout: OutputLayout,
    timeout: Duration,
}

impl MetadataResolver {
    /// Creates a resolver sharing `fetcher`'s connection pool.
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        endpoints: Endpoints,
        layout: OutputLayout,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            layout,
            timeout,
        }
    }

    /// Fetches, parses and snapshots the cover listing of `title_id`.
    ///
    /// A missing or non-list `Covers` field yields an empty list.
    ///
    /// # Errors
    ///
    /// [`ResolveError::MetadataFetchFailed`] when the fetch is exhausted,
    /// [`ResolveError::MetadataParseFailed`] when the body is not JSON.
    #[instrument(skip(self))]
    pub async fn resolve_covers(
        &self,
        title_id: &str,
    ) -> Result<Vec<CoverDescriptor>, ResolveError> {
        let document = self.resolve_document(title_id, MetadataKind::Covers).await?;
        let covers = covers_from_document(&document);
        debug!(count = covers.len(), "decoded cover listing");
        Ok(covers)
    }

    /// Fetches, parses and snapshots the update listing of `title_id`.
    ///
    /// A missing or non-list `MediaIDS` field yields an empty list.
    ///
    /// # Errors
    ///
    /// Same as [`resolve_covers`](Self::resolve_covers).
    #[instrument(skip(self))]
    pub async fn resolve_updates(
        &self,
        title_id: &str,
    ) -> Result<Vec<MediaDescriptor>, ResolveError> {
        let document = self
            .resolve_document(title_id, MetadataKind::Updates)
            .await?;
        let media = media_from_document(&document);
        debug!(count = media.len(), "decoded media listing");
        Ok(media)
    }

    async fn resolve_document(
        &self,
        title_id: &str,
        kind: MetadataKind,
    ) -> Result<Value, ResolveError> {
        let url = match kind {
            MetadataKind::Covers => self.endpoints.cover_info_url(title_id),
            MetadataKind::Updates => self.endpoints.update_info_url(title_id),
        };
        info!(title_id, %kind, "fetching metadata");

        let fetch_failed = |source: FetchError| ResolveError::MetadataFetchFailed {
            title_id: title_id.to_string(),
            kind,
            source,
        };
        let body = match self
            .fetcher
            .fetch(&url, BodyMode::Buffered, self.timeout)
            .await
            .into_result()
        {
            Ok(response) => response.into_bytes().await.map_err(fetch_failed)?,
            Err((source, attempts)) => {
                error!(title_id, %kind, attempts, "failed to fetch metadata");
                return Err(fetch_failed(source));
            }
        };

        let document: Value = serde_json::from_slice(&body).map_err(|source| {
            error!(title_id, %kind, error = %source, "invalid JSON metadata");
            ResolveError::MetadataParseFailed {
                title_id: title_id.to_string(),
                kind,
                source,
            }
        })?;

        self.persist_snapshot(title_id, kind, &document).await;
        Ok(document)
    }

    /// Writes `<root>/<title_id>/<kind>_data.json`. Failures are logged only.
    async fn persist_snapshot(&self, title_id: &str, kind: MetadataKind, document: &Value) {
        let path = self.layout.metadata_path(title_id, kind);
        match write_snapshot(&path, document).await {
            Ok(()) => info!(title_id, %kind, path = %path.display(), "saved metadata"),
            Err(e) => error!(
                title_id,
                %kind,
                path = %path.display(),
                error = %e,
                "failed to write metadata"
            ),
        }
    }
}

async fn write_snapshot(path: &Path, document: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    document
        .serialize(&mut serializer)
        .map_err(std::io::Error::other)?;
    tokio::fs::write(path, buf).await
}
