//! Worker pool for concurrent ingestion
//!
//! Each worker opens its own single-connection catalog handle when it
//! starts and closes it when the job channel runs dry. Handles are never
//! shared between workers.

use crate::catalog::CatalogDb;
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::progress::job_bar;
use futures::future::join_all;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

/// Fixed-size pool of ingestion workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    db_path: PathBuf,
    workers: usize,
    show_progress: bool,
}

impl WorkerPool {
    pub fn new(db_path: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            db_path: db_path.into(),
            workers: workers.max(1),
            show_progress: false,
        }
    }

    /// Draw a progress bar while jobs run
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job and return the results in submission order.
    ///
    /// `make_ingestor` builds each worker's ingestor around its own catalog
    /// handle; `handle` processes one job with it.
    pub async fn run<J, T, M, H, Fut>(
        &self,
        jobs: Vec<J>,
        make_ingestor: M,
        handle: H,
    ) -> Vec<Result<T>>
    where
        J: Send + 'static,
        T: Send + 'static,
        M: Fn(CatalogDb) -> Ingestor<CatalogDb> + Send + Sync + 'static,
        H: Fn(Arc<Ingestor<CatalogDb>>, J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        for job in jobs.into_iter().enumerate() {
            // The receiver is alive, so this cannot fail
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, Result<T>)>();
        let make_ingestor = Arc::new(make_ingestor);
        let handle = Arc::new(handle);
        let progress = if self.show_progress {
            job_bar(total, "Processing")
        } else {
            None
        };

        let worker_count = self.workers.min(total);
        debug!("Starting {} worker(s) for {} job(s)", worker_count, total);

        let tasks = (0..worker_count).map(|worker_id| {
            let db_path = self.db_path.clone();
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let make_ingestor = Arc::clone(&make_ingestor);
            let handle = Arc::clone(&handle);
            let progress = progress.clone();

            tokio::spawn(async move {
                let db = CatalogDb::open(&db_path, 1).await?;
                let ingestor = Arc::new(make_ingestor(db.clone()));

                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some((index, job)) = next else {
                        break;
                    };
                    let result = handle(Arc::clone(&ingestor), job).await;
                    let _ = result_tx.send((index, result));
                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                }

                debug!("Worker {} finished", worker_id);
                db.close().await;
                Ok::<(), Error>(())
            })
        });
        let outcomes = join_all(tasks).await;
        drop(result_tx);

        let mut worker_error = None;
        for outcome in outcomes {
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(join_error) => join_error.to_string(),
            };
            error!("Worker stopped early: {}", message);
            worker_error.get_or_insert(message);
        }

        let mut results: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = result_rx.recv().await {
            results[index] = Some(result);
        }

        if let Some(pb) = progress {
            pb.finish_with_message("Done");
        }

        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(Error::Other(format!(
                        "Job was not processed: {}",
                        worker_error.as_deref().unwrap_or("no worker available")
                    )))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DownloadTracker;
    use crate::fetch::{FetchOptions, FetchOutcome, FileFetcher};
    use crate::ingest::RequestOptions;
    use crate::metadata::MetadataRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct WritingFetcher {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FileFetcher for WritingFetcher {
        async fn fetch(
            &self,
            _record: &MetadataRecord,
            options: &FetchOptions,
        ) -> Result<FetchOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir_all(options.output_path.parent().unwrap()).await?;
            tokio::fs::write(&options.output_path, b"data").await?;
            Ok(FetchOutcome {
                return_code: 0,
                filepath: options.output_path.clone(),
            })
        }
    }

    fn record(id: &str) -> MetadataRecord {
        serde_json::from_value(json!({
            "id": id,
            "title": id,
            "extractor": "youtube",
            "extractor_key": "Youtube",
            "uploader": "Chan",
            "uploader_id": "chan1",
            "ext": "mp4"
        }))
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_keep_submission_order() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("catalog.db");
        let download_dir = tmp.path().join("downloads");
        CatalogDb::open(&db_path, 1).await.unwrap().close().await;

        // The duplicate id exercises two workers racing on one natural key
        let ids = ["a", "b", "c", "d", "a", "bad"];
        let jobs: Vec<String> = ids.iter().map(|s| s.to_string()).collect();

        let calls = Arc::new(AtomicUsize::new(0));
        let worker_calls = calls.clone();

        let pool = WorkerPool::new(&db_path, 3);
        let results = pool
            .run(
                jobs,
                move |db| {
                    let fetcher = WritingFetcher {
                        calls: worker_calls.clone(),
                    };
                    Ingestor::new(db, Arc::new(fetcher), "%(id)s.%(ext)s", download_dir.clone())
                },
                |ingestor, id: String| async move {
                    if id == "bad" {
                        return Err(Error::Extraction("no such video".to_string()));
                    }
                    let outcome = ingestor
                        .process(record(&id), &RequestOptions::with_format(1))
                        .await?;
                    Ok(outcome.id())
                },
            )
            .await;

        assert_eq!(results.len(), ids.len());
        assert!(results[..5].iter().all(|r| r.is_ok()));
        assert!(matches!(results[5], Err(Error::Extraction(_))));
        assert_eq!(results[0].as_ref().unwrap(), results[4].as_ref().unwrap());
        // The duplicate is claimed once and fetched once
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let db = CatalogDb::open(&db_path, 1).await.unwrap();
        let stats = db.catalog_stats().await.unwrap();
        assert_eq!(stats.video_count, 4);
        assert_eq!(stats.in_progress_count, 0);
        assert_eq!(db.recover_interrupted_downloads().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let tmp = TempDir::new().unwrap();
        let pool = WorkerPool::new(tmp.path().join("catalog.db"), 0);
        assert_eq!(pool.workers(), 1);

        let results: Vec<Result<i64>> = pool
            .run(
                Vec::<String>::new(),
                |db| Ingestor::new(db, Arc::new(WritingFetcher::default()), "%(id)s", "/tmp"),
                |_ingestor, _job: String| async move { Ok(1) },
            )
            .await;
        assert!(results.is_empty());
    }
}
