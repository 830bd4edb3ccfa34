//! Typed views of the cover and title-update metadata documents.
//!
//! The catalog is loose about types: ids show up as strings or numbers,
//! lists are sometimes missing or `null`. Decoding never fails on shape;
//! anything that is absent or has the wrong type becomes an empty value, and
//! entries without identifying fields are kept so the dispatcher can skip
//! them with a warning.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// One entry of the `Covers` array.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CoverDescriptor {
    /// Identifier passed to the cover-fetch endpoint.
    #[serde(rename = "CoverID", default, deserialize_with = "lenient_id")]
    pub cover_id: Option<String>,
    /// Every other field of the entry, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the `MediaIDS` array.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MediaDescriptor {
    /// Media grouping key; becomes a directory name.
    #[serde(rename = "MediaID", default, deserialize_with = "lenient_id")]
    pub media_id: Option<String>,
    /// Updates published for this media.
    #[serde(rename = "Updates", default, deserialize_with = "lenient_list")]
    pub updates: Vec<UpdateDescriptor>,
}

/// One entry of a media's `Updates` array.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UpdateDescriptor {
    /// Identifier passed to the update-fetch endpoint.
    #[serde(rename = "TitleUpdateID", default, deserialize_with = "lenient_id")]
    pub title_update_id: Option<String>,
    /// Update version; becomes part of the directory name.
    #[serde(rename = "Version", default, deserialize_with = "lenient_version")]
    pub version: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct CoverDocument {
    #[serde(rename = "Covers", default, deserialize_with = "lenient_list")]
    covers: Vec<CoverDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateDocument {
    #[serde(rename = "MediaIDS", default, deserialize_with = "lenient_list")]
    media: Vec<MediaDescriptor>,
}

/// Extracts the cover list from a parsed cover-metadata document.
#[must_use]
pub fn covers_from_document(document: &Value) -> Vec<CoverDescriptor> {
    decode_document::<CoverDocument>(document).covers
}

/// Extracts the media list from a parsed update-metadata document.
#[must_use]
pub fn media_from_document(document: &Value) -> Vec<MediaDescriptor> {
    decode_document::<UpdateDocument>(document).media
}

fn decode_document<T: DeserializeOwned + Default>(document: &Value) -> T {
    if !document.is_object() {
        debug!("metadata document is not a JSON object; treating as empty");
        return T::default();
    }
    T::deserialize(document).unwrap_or_else(|e| {
        debug!(error = %e, "metadata document did not decode; treating as empty");
        T::default()
    })
}

/// Array of objects; anything else is an empty list. Non-object entries
/// become `T::default()`.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| {
            if item.is_object() {
                serde_json::from_value(item).unwrap_or_default()
            } else {
                T::default()
            }
        })
        .collect())
}

/// Non-empty string kept verbatim, or a non-zero number rendered as text.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) if n.as_f64().is_some_and(|v| v.abs() > 0.0) => Some(n.to_string()),
        _ => None,
    })
}

/// Integer, or a string holding an integer.
fn lenient_version<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
