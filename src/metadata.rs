//! Metadata records produced by the extractor
//!
//! A [`MetadataRecord`] is the semi-structured JSON document emitted by
//! `yt-dlp --dump-single-json`: a handful of named fields the catalog relies
//! on, plus an open bag for everything else. [`normalize`] turns a record
//! into the fixed-shape [`NormalizedInfo`] consumed by the catalog.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

/// Placeholder used when uploader metadata is missing, matching the
/// extractor's own template convention.
pub const NOT_AVAILABLE: &str = "NA";

/// Prefix of synthesized identifiers for essential fields that are missing.
pub const PLACEHOLDER_PREFIX: &str = "ytdl_";

/// Raw metadata for a single item or a container of items
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Type discriminator (`video`, `playlist`, `multi_video`, ...)
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,

    /// Explicit position inside the containing playlist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_index: Option<i64>,

    /// Contained items for container types; unavailable items are `null`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<Option<MetadataRecord>>>,

    /// Every other field, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Interpretation of the `_type` discriminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Video,
    Playlist,
    MultiVideo,
    CompatList,
    /// `url`, `url_transparent` or anything unrecognized
    Other(String),
}

impl RecordKind {
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            RecordKind::Playlist | RecordKind::MultiVideo | RecordKind::CompatList
        )
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Video => write!(f, "video"),
            RecordKind::Playlist => write!(f, "playlist"),
            RecordKind::MultiVideo => write!(f, "multi_video"),
            RecordKind::CompatList => write!(f, "compat_list"),
            RecordKind::Other(tag) => write!(f, "{}", tag),
        }
    }
}

impl MetadataRecord {
    /// Classify the record; a missing discriminator means a single video
    pub fn kind(&self) -> RecordKind {
        match self.kind.as_deref() {
            None | Some("video") => RecordKind::Video,
            Some("playlist") => RecordKind::Playlist,
            Some("multi_video") => RecordKind::MultiVideo,
            Some("compat_list") => RecordKind::CompatList,
            Some(other) => RecordKind::Other(other.to_string()),
        }
    }

    /// Read a string-ish value from the open field bag
    fn extra_str(&self, key: &str) -> Option<String> {
        self.extra.get(key).and_then(value_to_string)
    }
}

/// Metadata in the fixed shape the catalog expects
#[derive(Debug, Clone)]
pub struct NormalizedInfo {
    pub extractor: String,
    pub extractor_key: String,
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub uploader_id: String,
    pub uploader_url: Option<String>,
    pub upload_date: Option<String>,
    pub duration: Option<f64>,
    pub ext: Option<String>,
    pub webpage_url: Option<String>,
    /// Destination computed from the output template, set before insertion
    pub filepath: Option<String>,
    /// The record this was normalized from
    pub raw: MetadataRecord,
}

impl NormalizedInfo {
    /// Value of a named field for template interpolation
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "title" => Some(self.title.clone()),
            "extractor" => Some(self.extractor.clone()),
            "extractor_key" => Some(self.extractor_key.clone()),
            "uploader" => Some(self.uploader.clone()),
            "uploader_id" => Some(self.uploader_id.clone()),
            "uploader_url" => self.uploader_url.clone(),
            "upload_date" => self.upload_date.clone(),
            "ext" => self.ext.clone(),
            "webpage_url" => self.webpage_url.clone(),
            "duration" => self.duration.map(|d| format!("{}", d.round() as i64)),
            "playlist_index" => self.raw.playlist_index.map(|i| i.to_string()),
            other => self.raw.extra_str(other),
        }
    }

    /// Human-readable `"title" [url]` label for log lines
    pub fn pretty_name(&self) -> String {
        format!(
            "\"{}\" [{}]",
            self.title,
            self.webpage_url.as_deref().unwrap_or(NOT_AVAILABLE)
        )
    }

    /// Duration rounded to whole seconds
    pub fn duration_secs(&self) -> Option<i64> {
        self.duration.map(|d| d.round() as i64)
    }
}

/// Fill in the fields the catalog relies on.
///
/// Missing fields are taken from a designated fallback field when present.
/// Essential fields that are still missing get a unique placeholder so
/// ingestion never aborts because optional metadata was absent.
pub fn normalize(record: MetadataRecord) -> NormalizedInfo {
    let extractor_key = resolve(
        "extractor_key",
        record.extractor_key.clone(),
        "extractor",
        record.extractor.clone(),
    );
    let extractor = resolve(
        "extractor",
        record.extractor.clone(),
        "extractor_key",
        record.extractor_key.clone(),
    );
    let uploader = resolve(
        "uploader",
        record.uploader.clone(),
        "channel",
        record.extra_str("channel"),
    );
    let uploader_id = resolve(
        "uploader_id",
        record.uploader_id.clone(),
        "channel_id",
        record.extra_str("channel_id"),
    )
    .or_else(|| {
        let name = uploader.clone()?;
        debug!("Set uploader_id to {} using uploader", name);
        Some(name)
    });
    let uploader_url = resolve(
        "uploader_url",
        record.uploader_url.clone(),
        "channel_url",
        record.extra_str("channel_url"),
    );
    let upload_date = resolve(
        "upload_date",
        record.upload_date.clone(),
        "release_date",
        record.extra_str("release_date"),
    );
    let title = resolve(
        "title",
        record.title.clone(),
        "fulltitle",
        record.extra_str("fulltitle"),
    );
    let id = resolve("id", record.id.clone(), "display_id", record.extra_str("display_id"));
    let webpage_url = resolve(
        "webpage_url",
        record.webpage_url.clone(),
        "original_url",
        record.extra_str("original_url"),
    );

    if record.duration.is_none() {
        warn!("Missing metadata key: duration");
    }
    if record.ext.is_none() {
        warn!("Missing metadata key: ext");
    }

    NormalizedInfo {
        extractor: essential("extractor", extractor),
        extractor_key: essential("extractor_key", extractor_key),
        id: essential("id", id),
        title: essential("title", title),
        uploader: uploader.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        uploader_id: uploader_id.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        uploader_url,
        upload_date: upload_date.filter(|d| !d.trim().is_empty()),
        duration: record.duration,
        ext: record.ext.clone(),
        webpage_url,
        filepath: None,
        raw: record,
    }
}

fn resolve(
    key: &str,
    value: Option<String>,
    fallback_key: &str,
    fallback: Option<String>,
) -> Option<String> {
    if value.is_some() {
        return value;
    }

    warn!("Missing metadata key: {}", key);
    if let Some(fallback) = fallback {
        debug!("Set {} to {} using {}", key, fallback, fallback_key);
        return Some(fallback);
    }
    None
}

fn essential(key: &str, value: Option<String>) -> String {
    value.unwrap_or_else(|| {
        let generated = generate_placeholder_id();
        debug!("Set {} to {}", key, generated);
        generated
    })
}

/// Generate an identifier of the form `ytdl_YYYY-MM-DD_HH-MM-SS_xxxxxxxxxx`
pub fn generate_placeholder_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}_{}",
        PLACEHOLDER_PREFIX,
        Local::now().format("%Y-%m-%d_%H-%M-%S"),
        &suffix[..10]
    )
}

/// Parse an upload date given as `YYYYMMDD` (or already as `YYYY-MM-DD`).
///
/// Empty or malformed input yields `None`; a date is never fabricated.
pub fn parse_upload_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(trimmed, "%Y%m%d").ok();
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> MetadataRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_discriminator() {
        assert_eq!(record(json!({"id": "a"})).kind(), RecordKind::Video);
        assert_eq!(record(json!({"_type": "video"})).kind(), RecordKind::Video);
        assert!(record(json!({"_type": "playlist"})).kind().is_container());
        assert!(record(json!({"_type": "multi_video"})).kind().is_container());
        assert!(record(json!({"_type": "compat_list"})).kind().is_container());
        assert_eq!(
            record(json!({"_type": "url_transparent"})).kind(),
            RecordKind::Other("url_transparent".to_string())
        );
    }

    #[test]
    fn test_unknown_fields_land_in_extra() {
        let rec = record(json!({
            "id": "abc",
            "title": "Title",
            "view_count": 12,
            "entries": [{"id": "x"}, null]
        }));
        assert_eq!(rec.extra.get("view_count"), Some(&json!(12)));
        let entries = rec.entries.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_none());
    }

    #[test]
    fn test_normalize_uses_fallbacks() {
        let info = normalize(record(json!({
            "extractor_key": "Youtube",
            "channel": "Some Channel",
            "channel_id": "UC123",
            "fulltitle": "Full Title",
            "display_id": "disp",
            "release_date": "20200101",
            "original_url": "https://example.com/v"
        })));

        assert_eq!(info.extractor, "Youtube");
        assert_eq!(info.extractor_key, "Youtube");
        assert_eq!(info.uploader, "Some Channel");
        assert_eq!(info.uploader_id, "UC123");
        assert_eq!(info.title, "Full Title");
        assert_eq!(info.id, "disp");
        assert_eq!(info.upload_date.as_deref(), Some("20200101"));
        assert_eq!(info.webpage_url.as_deref(), Some("https://example.com/v"));
    }

    #[test]
    fn test_uploader_id_falls_back_to_uploader_name() {
        let alice = normalize(record(json!({"id": "a", "uploader": "Alice"})));
        let bob = normalize(record(json!({"id": "b", "uploader": "Bob"})));
        assert_eq!(alice.uploader_id, "Alice");
        assert_eq!(bob.uploader_id, "Bob");

        let by_channel = normalize(record(json!({"id": "c", "channel": "Carol"})));
        assert_eq!(by_channel.uploader_id, "Carol");

        // channel_id still wins over the name
        let both = normalize(record(json!({
            "id": "d",
            "uploader": "Dave",
            "channel_id": "UC9"
        })));
        assert_eq!(both.uploader_id, "UC9");
    }

    #[test]
    fn test_normalize_synthesizes_essentials() {
        let info = normalize(MetadataRecord::default());

        assert!(info.id.starts_with(PLACEHOLDER_PREFIX));
        assert!(info.title.starts_with(PLACEHOLDER_PREFIX));
        assert!(info.extractor.starts_with(PLACEHOLDER_PREFIX));
        assert!(info.extractor_key.starts_with(PLACEHOLDER_PREFIX));
        assert_ne!(info.id, info.title);
        assert_eq!(info.uploader, NOT_AVAILABLE);
        assert_eq!(info.uploader_id, NOT_AVAILABLE);
        assert!(info.upload_date.is_none());
        assert!(info.webpage_url.is_none());
    }

    #[test]
    fn test_placeholder_format() {
        let id = generate_placeholder_id();
        // ytdl_ + 19 timestamp chars + _ + 10 random chars
        assert_eq!(id.len(), PLACEHOLDER_PREFIX.len() + 19 + 1 + 10);
        assert_ne!(id, generate_placeholder_id());
    }

    #[test]
    fn test_empty_upload_date_is_absent() {
        let info = normalize(record(json!({"id": "a", "upload_date": ""})));
        assert!(info.upload_date.is_none());
    }

    #[test]
    fn test_parse_upload_date() {
        assert_eq!(
            parse_upload_date("20230115"),
            NaiveDate::from_ymd_opt(2023, 1, 15)
        );
        assert_eq!(
            parse_upload_date("2023-01-15"),
            NaiveDate::from_ymd_opt(2023, 1, 15)
        );
        assert_eq!(parse_upload_date(""), None);
        assert_eq!(parse_upload_date("00000000"), None);
        assert_eq!(parse_upload_date("2023011"), None);
    }

    #[test]
    fn test_field_lookup() {
        let info = normalize(record(json!({
            "id": "abc",
            "title": "T",
            "duration": 61.6,
            "playlist_index": 4,
            "view_count": 10,
            "tags": ["a"]
        })));
        assert_eq!(info.field("duration").as_deref(), Some("62"));
        assert_eq!(info.field("playlist_index").as_deref(), Some("4"));
        assert_eq!(info.field("view_count").as_deref(), Some("10"));
        assert_eq!(info.field("tags"), None);
        assert_eq!(info.field("ext"), None);
        assert_eq!(info.duration_secs(), Some(62));
    }
}
