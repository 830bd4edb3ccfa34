//! Filename selection for downloaded binaries.
//!
//! The server's `Content-Disposition` name wins; otherwise the name is
//! derived from the descriptor id (and, for covers, the MIME subtype).
//! Every name is sanitized so it stays inside the task's directory.

use std::path::{Component, Path};

/// Extension used for covers when the response has no usable `Content-Type`.
pub const DEFAULT_COVER_EXTENSION: &str = "jpg";

/// How to name a file when the server does not suggest one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackName {
    /// `<cover_id>.<mime subtype>`
    Cover {
        /// The cover's id.
        cover_id: String,
    },
    /// `update_<title_update_id>.bin`
    Update {
        /// The update's id.
        title_update_id: String,
    },
}

impl FallbackName {
    /// Builds the fallback name for a response with the given `Content-Type`.
    #[must_use]
    pub fn render(&self, content_type: Option<&str>) -> String {
        match self {
            Self::Cover { cover_id } => {
                let ext = content_type
                    .and_then(subtype_from_content_type)
                    .unwrap_or(DEFAULT_COVER_EXTENSION);
                format!("{cover_id}.{ext}")
            }
            Self::Update { title_update_id } => format!("update_{title_update_id}.bin"),
        }
    }
}

/// Picks the on-disk filename for a response.
#[must_use]
pub fn resolve_filename(
    content_disposition: Option<&str>,
    content_type: Option<&str>,
    fallback: &FallbackName,
) -> String {
    content_disposition
        .and_then(parse_content_disposition)
        .map(|name| sanitize_filename(&name))
        .unwrap_or_else(|| sanitize_filename(&fallback.render(content_type)))
}

/// MIME subtype without parameters: `image/png; q=1` -> `png`.
fn subtype_from_content_type(content_type: &str) -> Option<&str> {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    let (_, subtype) = mime.split_once('/')?;
    let subtype = subtype.trim();
    (!subtype.is_empty()).then_some(subtype)
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="front.jpg"`
/// - `attachment; filename=front.jpg`
/// - `attachment; filename*=UTF-8''front%20cover.jpg` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                let decoded = decoded.trim().trim_matches('"').trim();
                if !decoded.is_empty() {
                    return Some(decoded.to_string());
                }
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();
    let name = if let Some(stripped) = value.strip_prefix('"') {
        stripped.find('"').map_or(stripped, |end| &stripped[..end])
    } else {
        let end = value.find(';').unwrap_or(value.len());
        &value[..end]
    };
    let name = name.trim().trim_matches('"').trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// True when `name` is exactly one normal path component, so joining it onto
/// a directory stays inside that directory.
pub(crate) fn is_single_path_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
