//! Add command implementation

use crate::config::Settings;
use crate::error::Result;
use crate::fetch::{FileFetcher, MetadataExtractor, YtDlp};
use crate::ingest::{IngestOutcome, Ingestor, RequestOptions};
use crate::worker::WorkerPool;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct AddOptions {
    pub urls: Vec<String>,
    /// Format id; the configured default when `None`
    pub format_id: Option<i64>,
    /// Worker count; the configured maximum when `None`
    pub jobs: Option<usize>,
    pub show_progress: bool,
}

/// Outcome of one submitted URL
#[derive(Debug, Clone, Serialize)]
pub struct AddResult {
    pub url: String,
    pub outcome: Option<IngestOutcome>,
    pub error: Option<String>,
}

impl AddResult {
    fn from_result(url: String, result: Result<IngestOutcome>) -> Self {
        match result {
            Ok(outcome) => Self {
                url,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                url,
                outcome: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Ingest every URL through the worker pool
pub async fn cmd_add(settings: &Settings, options: AddOptions) -> Result<Vec<AddResult>> {
    let format_id = options.format_id.unwrap_or(settings.default_format);
    let workers = options.jobs.unwrap_or(settings.max_workers);

    let mut rejected = Vec::new();
    let mut urls = Vec::new();
    for url in options.urls {
        match Url::parse(&url) {
            Ok(_) => urls.push(url),
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                rejected.push(AddResult::from_result(url, Err(e.into())));
            }
        }
    }

    info!("Adding {} URL(s) with {} worker(s)", urls.len(), workers);
    let results = run_with_extractor(
        settings,
        Arc::new(YtDlp::from_settings(settings)),
        urls.clone(),
        format_id,
        workers,
        options.show_progress,
    )
    .await;

    let mut report: Vec<AddResult> = urls
        .into_iter()
        .zip(results)
        .map(|(url, result)| AddResult::from_result(url, result))
        .collect();
    report.extend(rejected);
    Ok(report)
}

async fn run_with_extractor<X>(
    settings: &Settings,
    backend: Arc<X>,
    urls: Vec<String>,
    format_id: i64,
    workers: usize,
    show_progress: bool,
) -> Vec<Result<IngestOutcome>>
where
    X: MetadataExtractor + FileFetcher + 'static,
{
    let fetcher: Arc<dyn FileFetcher> = backend.clone();
    let template = settings.output_template.clone();
    let download_dir = settings.download_dir.clone();

    WorkerPool::new(&settings.db_file, workers)
        .with_progress(show_progress)
        .run(
            urls,
            move |db| Ingestor::new(db, fetcher.clone(), template.clone(), download_dir.clone()),
            move |ingestor, url: String| {
                let extractor = Arc::clone(&backend);
                async move {
                    ingestor
                        .process_url(extractor.as_ref(), &url, &RequestOptions::with_format(format_id))
                        .await
                }
            },
        )
        .await
}

/// Print add results to console
pub fn print_add_results(results: &[AddResult]) {
    println!("\n📥 Add Results\n");

    for result in results {
        match (&result.outcome, &result.error) {
            (Some(IngestOutcome::Video(video)), _) => {
                let status = match (&video.error, video.fetched) {
                    (Some(reason), _) => format!("✗ download failed: {}", reason),
                    (None, true) => "✓ downloaded".to_string(),
                    (None, false) => "✓ already downloaded".to_string(),
                };
                println!("• {} [video {}] {}", video.title, video.video_id, status);
            }
            (Some(IngestOutcome::Playlist(playlist)), _) => {
                println!(
                    "• {} [collection {}] {} entr{}",
                    playlist.title,
                    playlist.collection_id,
                    playlist.entries.len(),
                    if playlist.entries.len() == 1 { "y" } else { "ies" }
                );
                for error in &playlist.errors {
                    println!("    ⚠ {}", error);
                }
            }
            (None, Some(error)) => println!("• {} ✗ {}", result.url, error),
            (None, None) => println!("• {}", result.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogDb;
    use crate::config::Config;
    use crate::error::Error;
    use crate::fetch::{FetchOptions, FetchOutcome};
    use crate::metadata::MetadataRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    /// Extracts a single video per URL and writes the destination file
    struct FakeBackend;

    #[async_trait]
    impl MetadataExtractor for FakeBackend {
        async fn extract(&self, url: &str) -> Result<MetadataRecord> {
            let id = url
                .rsplit('=')
                .next()
                .ok_or_else(|| Error::Extraction(url.to_string()))?;
            if id == "missing" {
                return Err(Error::Extraction("Video unavailable".to_string()));
            }
            Ok(serde_json::from_value(json!({
                "id": id,
                "title": id,
                "extractor_key": "Youtube",
                "ext": "mp4",
                "webpage_url": url
            }))?)
        }
    }

    #[async_trait]
    impl FileFetcher for FakeBackend {
        async fn fetch(
            &self,
            _record: &MetadataRecord,
            options: &FetchOptions,
        ) -> Result<FetchOutcome> {
            tokio::fs::create_dir_all(options.output_path.parent().unwrap()).await?;
            tokio::fs::write(&options.output_path, b"x").await?;
            Ok(FetchOutcome {
                return_code: 0,
                filepath: options.output_path.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_results_follow_url_order() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.base_dir = tmp.path().to_path_buf();
        config.paths.db_file = tmp.path().join("catalog.db");
        let settings = config.settings_with(|_| None).unwrap();
        CatalogDb::open(&settings.db_file, 1).await.unwrap().close().await;

        let urls = vec![
            "https://example.com/watch?v=one".to_string(),
            "https://example.com/watch?v=missing".to_string(),
            "https://example.com/watch?v=two".to_string(),
        ];
        let results =
            run_with_extractor(&settings, Arc::new(FakeBackend), urls, 1, 2, false).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Extraction(_))));
        assert!(results[2].is_ok());
        assert!(tmp
            .path()
            .join("downloads")
            .join("NA")
            .join("one [one].mp4")
            .exists());
    }

    #[test]
    fn test_add_result_keeps_error_text() {
        let result = AddResult::from_result(
            "u".to_string(),
            Err(Error::UnsupportedContainerType("url".to_string())),
        );
        assert_eq!(
            result.error.as_deref(),
            Some("Unhandled metadata response type: url")
        );
    }
}
