//! Output-path templates
//!
//! Templates use the extractor's `%(field)s` syntax. Rendering happens once,
//! when a video is first inserted, and the result is stored with the row.

use crate::metadata::{NormalizedInfo, NOT_AVAILABLE};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static FIELD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn field_pattern() -> &'static Regex {
    FIELD_PATTERN.get_or_init(|| {
        Regex::new(r"%%|%\((?P<name>[A-Za-z0-9_]+)\)(?P<conv>[sd])").expect("valid template regex")
    })
}

/// Render `template` against the normalized record
pub fn render(template: &str, info: &NormalizedInfo) -> String {
    field_pattern()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let Some(name) = caps.name("name") else {
                return "%".to_string();
            };
            let value = info.field(name.as_str());
            match caps.name("conv").map(|m| m.as_str()) {
                Some("d") => value
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .map(|n| format!("{}", n.round() as i64))
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                _ => value
                    .map(|v| sanitize_component(&v))
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            }
        })
        .into_owned()
}

/// Resolve the destination path for a record under `download_dir`
pub fn destination(download_dir: &Path, template: &str, info: &NormalizedInfo) -> PathBuf {
    download_dir.join(render(template, info))
}

/// Keep substituted values from introducing directories
fn sanitize_component(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" => NOT_AVAILABLE.to_string(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}
