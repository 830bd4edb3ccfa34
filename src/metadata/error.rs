//! Error types for metadata resolution.

use thiserror::Error;

use super::MetadataKind;
use crate::fetch::FetchError;

/// Why a metadata document could not be resolved.
///
/// In both cases nothing is written to disk.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The info endpoint could not be fetched within the retry budget.
    #[error("failed to fetch {kind} metadata for {title_id}: {source}")]
    MetadataFetchFailed {
        /// The title being resolved.
        title_id: String,
        /// Which document.
        kind: MetadataKind,
        /// The last fetch error.
        #[source]
        source: FetchError,
    },

    /// The info endpoint answered with something that is not JSON.
    #[error("invalid JSON in {kind} metadata for {title_id}: {source}")]
    MetadataParseFailed {
        /// The title being resolved.
        title_id: String,
        /// Which document.
        kind: MetadataKind,
        /// The parser error.
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failed_display_names_title_and_kind() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let error = ResolveError::MetadataParseFailed {
            title_id: "555308C5".to_string(),
            kind: MetadataKind::Updates,
            source,
        };
        let msg = error.to_string();
        assert!(msg.contains("555308C5"), "Expected title id in: {msg}");
        assert!(msg.contains("updates"), "Expected kind in: {msg}");
    }

    #[test]
    fn test_fetch_failed_display_includes_cause() {
        let error = ResolveError::MetadataFetchFailed {
            title_id: "X".to_string(),
            kind: MetadataKind::Covers,
            source: FetchError::http_status("http://host/CoverInfo.php?titleid=X", 500),
        };
        let msg = error.to_string();
        assert!(msg.contains("covers metadata for X"), "got: {msg}");
        assert!(msg.contains("HTTP 500"), "got: {msg}");
    }
}
