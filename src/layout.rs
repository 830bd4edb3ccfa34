//! On-disk output layout.
//!
//! ```text
//! <root>/<title_id>/covers_data.json
//! <root>/<title_id>/updates_data.json
//! <root>/<title_id>/covers/<filename>
//! <root>/<title_id>/<media_id>/updateversion<version>/<filename>
//! ```
//!
//! Paths depend only on the title id and descriptor fields, so concurrent
//! tasks never share a destination directory they did not both derive.

use std::path::{Path, PathBuf};

use crate::metadata::MetadataKind;

/// Path builder rooted at the configured output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<title_id>`
    #[must_use]
    pub fn title_dir(&self, title_id: &str) -> PathBuf {
        self.root.join(title_id)
    }

    /// `<root>/<title_id>/<kind>_data.json`
    #[must_use]
    pub fn metadata_path(&self, title_id: &str, kind: MetadataKind) -> PathBuf {
        self.title_dir(title_id)
            .join(format!("{}_data.json", kind.as_str()))
    }

    /// `<root>/<title_id>/covers`
    #[must_use]
    pub fn covers_dir(&self, title_id: &str) -> PathBuf {
        self.title_dir(title_id).join("covers")
    }

    /// `<root>/<title_id>/<media_id>/updateversion<version>`
    #[must_use]
    pub fn update_dir(&self, title_id: &str, media_id: &str, version: i64) -> PathBuf {
        self.title_dir(title_id)
            .join(media_id)
            .join(format!("updateversion{version}"))
    }
}
