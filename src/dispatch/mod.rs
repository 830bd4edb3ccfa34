//! Parallel download dispatch: turns resolved descriptors into tasks and runs
//! them on a bounded worker pool, streaming each body to disk.

mod engine;
mod error;
mod filename;
mod task;

pub use engine::{DispatchReport, Dispatcher};
pub use error::DispatchError;
pub use filename::{DEFAULT_COVER_EXTENSION, FallbackName, resolve_filename};
pub use task::{
    DownloadTask, PlannedTask, SkipReason, SkippedEntry, cover_tasks, update_tasks,
};
