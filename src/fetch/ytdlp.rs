//! `yt-dlp` subprocess backend

use super::{FetchOptions, FetchOutcome, FileFetcher, MetadataExtractor};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::metadata::MetadataRecord;
use anyhow::Context;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Containers `--merge-output-format` accepts
const MERGE_FORMATS: &[&str] = &["avi", "flv", "mkv", "mov", "mp4", "webm"];

/// Runs the configured `yt-dlp` compatible program
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    extra_args: Vec<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.extractor_program.clone(),
            settings.extractor_args.clone(),
        )
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args);
        cmd.stdin(Stdio::null());
        cmd
    }
}

fn extract_args(url: &str) -> Vec<OsString> {
    vec![
        "--dump-single-json".into(),
        "--no-warnings".into(),
        url.into(),
    ]
}

fn fetch_args(info_json: &Path, options: &FetchOptions, ext: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--load-info-json".into(),
        info_json.into(),
        "-f".into(),
        options.format.clone().into(),
        "-o".into(),
        // yt-dlp reads -o as a template
        options.output_path.to_string_lossy().replace('%', "%%").into(),
        "--no-progress".into(),
    ];
    // Keep merged output at the stored destination
    if let Some(ext) = ext.filter(|e| MERGE_FORMATS.contains(e)) {
        args.push("--merge-output-format".into());
        args.push(ext.into());
    }
    args
}

#[async_trait]
impl MetadataExtractor for YtDlp {
    async fn extract(&self, url: &str) -> Result<MetadataRecord> {
        debug!("Extracting metadata for {}", url);

        let output = self
            .command()
            .args(extract_args(url))
            .output()
            .await
            .with_context(|| format!("running {} for {}", self.program, url))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extraction(format!(
                "{} failed for {} ({}): {}",
                self.program,
                url,
                output.status,
                stderr.trim()
            )));
        }

        let record: MetadataRecord = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parsing metadata for {}", url))?;
        Ok(record)
    }
}

#[async_trait]
impl FileFetcher for YtDlp {
    async fn fetch(&self, record: &MetadataRecord, options: &FetchOptions) -> Result<FetchOutcome> {
        if let Some(parent) = options.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let info_json =
            std::env::temp_dir().join(format!("tubecatalog-{}.info.json", Uuid::new_v4()));
        tokio::fs::write(&info_json, serde_json::to_vec(record)?)
            .await
            .with_context(|| format!("writing {}", info_json.display()))?;

        debug!(
            "Fetching {} to {}",
            record.id.as_deref().unwrap_or("?"),
            options.output_path.display()
        );
        let status = self
            .command()
            .args(fetch_args(&info_json, options, record.ext.as_deref()))
            .stdout(Stdio::null())
            .status()
            .await
            .with_context(|| format!("running {}", self.program));

        if let Err(e) = tokio::fs::remove_file(&info_json).await {
            warn!("Could not remove {}: {}", info_json.display(), e);
        }

        let status = status?;
        Ok(FetchOutcome {
            return_code: status.code().unwrap_or(-1),
            filepath: options.output_path.clone(),
        })
    }
}
