//! External collaborators: metadata extraction and file fetching
//!
//! Both are traits so the ingestion path can run against the real
//! `yt-dlp` binary or an in-process stand-in.

mod ytdlp;

pub use ytdlp::*;

use crate::error::Result;
use crate::metadata::MetadataRecord;
use async_trait::async_trait;
use std::path::PathBuf;

/// Produces a metadata record for a URL
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<MetadataRecord>;
}

/// Options for a single file fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Format selector understood by the fetcher
    pub format: String,
    /// Where the artifact must end up
    pub output_path: PathBuf,
}

/// Result reported by the fetcher
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub return_code: i32,
    pub filepath: PathBuf,
}

/// Downloads the media described by a record to disk
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, record: &MetadataRecord, options: &FetchOptions) -> Result<FetchOutcome>;
}
