//! Download queue commands: listing, retrying and running queued downloads

use crate::catalog::{
    format_timestamp, CatalogDb, DownloadOutcome, DownloadTracker, VideoDetails,
};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::fetch::{FileFetcher, MetadataExtractor, YtDlp};
use crate::ingest::{IngestOutcome, Ingestor, RequestOptions};
use crate::worker::WorkerPool;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Reason recorded for queued videos that have no source URL
pub const MISSING_URL_REASON: &str = "No source URL recorded";

#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub video_ids: Vec<i64>,
    /// Queue every failed download as well
    pub all_failed: bool,
    /// Seconds to wait before the retry becomes due
    pub delay_secs: u64,
}

/// Queue summary after a retry
#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    pub queued: Vec<i64>,
    pub not_before: String,
}

/// Outcome of one queued download
#[derive(Debug, Clone, Serialize)]
pub struct QueueRunResult {
    pub video_id: i64,
    pub title: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Rows removed by an admin clear
#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub cleared: u64,
}

/// Queued downloads, earliest eligible first
pub async fn cmd_queue(db: &CatalogDb, limit: i64) -> Result<Vec<VideoDetails>> {
    db.get_queued_downloads(limit).await
}

pub async fn cmd_failed(db: &CatalogDb) -> Result<Vec<VideoDetails>> {
    db.get_failed_downloads().await
}

/// Most recently downloaded videos
pub async fn cmd_history(db: &CatalogDb, limit: i64) -> Result<Vec<VideoDetails>> {
    db.get_recent_downloads(limit).await
}

/// Put videos back on the download queue
pub async fn cmd_retry(db: &CatalogDb, options: RetryOptions) -> Result<RetryReport> {
    let mut ids = options.video_ids;
    if options.all_failed {
        ids.extend(db.get_failed_downloads().await?.into_iter().map(|v| v.id));
    }
    ids.sort_unstable();
    ids.dedup();

    if ids.is_empty() {
        return Err(Error::InvalidArguments(
            "no video ids given and no failed downloads to retry".to_string(),
        ));
    }

    // Validate everything before queuing anything
    for id in &ids {
        if db.get_video(*id).await?.is_none() {
            return Err(Error::VideoNotFound(id.to_string()));
        }
    }

    let not_before = i64::try_from(options.delay_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|delay| Utc::now().checked_add_signed(delay))
        .ok_or_else(|| {
            Error::InvalidArguments(format!("delay of {}s is out of range", options.delay_secs))
        })?;
    for id in &ids {
        db.mark_download_queued(*id, Some(not_before)).await?;
    }
    info!("Queued {} download(s)", ids.len());

    Ok(RetryReport {
        queued: ids,
        not_before: format_timestamp(not_before),
    })
}

/// Download every due item on the queue through the worker pool
pub async fn cmd_run_queue(
    settings: &Settings,
    db: &CatalogDb,
    limit: i64,
    show_progress: bool,
) -> Result<Vec<QueueRunResult>> {
    let backend = Arc::new(YtDlp::from_settings(settings));
    run_queue_with(settings, db, backend, limit, show_progress).await
}

async fn run_queue_with<X>(
    settings: &Settings,
    db: &CatalogDb,
    backend: Arc<X>,
    limit: i64,
    show_progress: bool,
) -> Result<Vec<QueueRunResult>>
where
    X: MetadataExtractor + FileFetcher + 'static,
{
    let due = db.get_due_downloads(limit).await?;
    if due.is_empty() {
        info!("Nothing due on the download queue");
        return Ok(Vec::new());
    }

    let mut report = Vec::with_capacity(due.len());
    let mut jobs = Vec::with_capacity(due.len());
    for video in due {
        match video.url.clone() {
            Some(url) => jobs.push((video, url)),
            None => {
                warn!(video_id = video.id, "Queued video has no URL");
                db.mark_download_ended(
                    video.id,
                    &DownloadOutcome::Failed(MISSING_URL_REASON.to_string()),
                )
                .await?;
                report.push(QueueRunResult {
                    video_id: video.id,
                    title: video.title,
                    succeeded: false,
                    error: Some(MISSING_URL_REASON.to_string()),
                });
            }
        }
    }

    let default_format = settings.default_format;
    let fetcher: Arc<dyn FileFetcher> = backend.clone();
    let template = settings.output_template.clone();
    let download_dir = settings.download_dir.clone();
    let videos: Vec<(i64, String)> = jobs.iter().map(|(v, _)| (v.id, v.title.clone())).collect();

    let results = WorkerPool::new(&settings.db_file, settings.max_workers)
        .with_progress(show_progress)
        .run(
            jobs,
            move |db| Ingestor::new(db, fetcher.clone(), template.clone(), download_dir.clone()),
            move |ingestor, (video, url): (VideoDetails, String)| {
                let extractor = Arc::clone(&backend);
                async move {
                    let options =
                        RequestOptions::with_format(video.format_id.unwrap_or(default_format));
                    ingestor
                        .process_queued(extractor.as_ref(), video.id, &url, &options)
                        .await
                }
            },
        )
        .await;

    for ((video_id, title), result) in videos.into_iter().zip(results) {
        let error = match result {
            Ok(IngestOutcome::Video(video)) if video.video_id == video_id => video.error,
            Ok(_) => Some(format!("Re-extraction did not yield video {}", video_id)),
            Err(e) => Some(e.to_string()),
        };
        report.push(QueueRunResult {
            video_id,
            title,
            succeeded: error.is_none(),
            error,
        });
    }
    Ok(report)
}

pub async fn cmd_clear_queue(db: &CatalogDb) -> Result<ClearReport> {
    let cleared = db.clear_download_queue().await?;
    info!("Cleared {} queued download(s)", cleared);
    Ok(ClearReport { cleared })
}

pub async fn cmd_clear_in_progress(db: &CatalogDb) -> Result<ClearReport> {
    let cleared = db.clear_download_in_progress().await?;
    info!("Cleared {} in-progress download(s)", cleared);
    Ok(ClearReport { cleared })
}

/// Print a list of videos with their download state
pub fn print_download_list(heading: &str, videos: &[VideoDetails], empty: &str) {
    println!("\n{}\n", heading);

    if videos.is_empty() {
        println!("{}", empty);
        return;
    }

    for video in videos {
        println!("• [{}] {}", video.id, video.title);
        println!("  {} · {}", video.extractor_name, video.download_state());
        if let Some(not_before) = video.not_before.as_deref().filter(|_| video.queued) {
            println!("  Not before: {}", not_before);
        }
        if let Some(error) = &video.error_text {
            println!("  Error: {}", error);
        }
        if let Some(when) = &video.download_datetime {
            println!("  Downloaded: {}", when);
        }
    }
}

pub fn print_retry(report: &RetryReport) {
    println!(
        "✓ Queued {} download(s), due {}",
        report.queued.len(),
        report.not_before
    );
}

pub fn print_queue_run(results: &[QueueRunResult]) {
    println!("\n⬇ Queue Run\n");

    if results.is_empty() {
        println!("Nothing was due.");
        return;
    }

    for result in results {
        match &result.error {
            None => println!("✓ [{}] {}", result.video_id, result.title),
            Some(error) => println!("✗ [{}] {}: {}", result.video_id, result.title, error),
        }
    }
    let failed = results.iter().filter(|r| !r.succeeded).count();
    println!("\n{} succeeded, {} failed", results.len() - failed, failed);
}
