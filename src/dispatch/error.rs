//! Per-task download errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// Why a single download task failed. Never escapes the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The binary could not be fetched within the retry budget.
    #[error("failed to fetch {label} after {attempts} attempt(s): {source}")]
    Fetch {
        /// Task label.
        label: String,
        /// Attempts made.
        attempts: u32,
        /// Last fetch error.
        #[source]
        source: FetchError,
    },

    /// The body stream broke mid-download.
    #[error("download of {label} interrupted: {source}")]
    Stream {
        /// Task label.
        label: String,
        /// Read error.
        #[source]
        source: FetchError,
    },

    /// The destination directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Creating or writing the destination file failed.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
