//! Transient download state: queued, in progress, failed

use super::{
    format_timestamp, now_timestamp, CatalogDb, DownloadOutcome, DownloadState, ProcessOwner,
    VideoDetails,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sysinfo::System;
use tracing::{debug, info, warn};

/// Failure reason recorded for downloads interrupted by a crash
pub const INTERRUPTED_REASON: &str = "Process terminated unexpectedly";

/// Transitions of the per-video download state machine
#[async_trait]
pub trait DownloadTracker: Send + Sync {
    /// Queue a video; it becomes eligible at `not_before` (now if `None`)
    async fn mark_download_queued(
        &self,
        video_id: i64,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Claim the download for this process. Returns `false` without
    /// changing anything when someone else already holds the claim.
    async fn mark_download_started(&self, video_id: i64) -> Result<bool>;

    /// Record how a download ended and take the video off the queue
    async fn mark_download_ended(&self, video_id: i64, outcome: &DownloadOutcome) -> Result<()>;

    /// Move in-progress downloads whose owning process is gone to failed;
    /// returns how many moved
    async fn recover_interrupted_downloads(&self) -> Result<u64>;

    async fn clear_download_queue(&self) -> Result<u64>;

    async fn clear_download_in_progress(&self) -> Result<u64>;
}

#[async_trait]
impl DownloadTracker for CatalogDb {
    async fn mark_download_queued(
        &self,
        video_id: i64,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let now = Utc::now();
        let not_before = format_timestamp(not_before.unwrap_or(now));
        sqlx::query(
            r#"
            INSERT INTO download_queued (video_id, queued_datetime, not_before)
            VALUES (?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                queued_datetime = excluded.queued_datetime,
                not_before = excluded.not_before
            "#,
        )
        .bind(video_id)
        .bind(format_timestamp(now))
        .bind(&not_before)
        .execute(&self.pool)
        .await?;
        debug!(video_id, not_before = %not_before, "Queued download");
        Ok(())
    }

    async fn mark_download_started(&self, video_id: i64) -> Result<bool> {
        let owner = ProcessOwner::current();
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            r#"
            INSERT INTO download_in_progress (video_id, start_datetime, owner_pid, owner_started)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(video_id) DO NOTHING
            "#,
        )
        .bind(video_id)
        .bind(now_timestamp())
        .bind(i64::from(owner.pid))
        .bind(owner.started)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !claimed {
            tx.rollback().await?;
            debug!(video_id, "Download already in progress");
            return Ok(false);
        }

        sqlx::query("DELETE FROM download_queued WHERE video_id = ?")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM download_failed WHERE video_id = ?")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        debug!(video_id, "Download started");
        Ok(true)
    }

    async fn mark_download_ended(&self, video_id: i64, outcome: &DownloadOutcome) -> Result<()> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM download_in_progress WHERE video_id = ?")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM download_queued WHERE video_id = ?")
            .bind(video_id)
            .execute(&mut *tx)
            .await?;

        match outcome {
            DownloadOutcome::Succeeded => {
                sqlx::query("DELETE FROM download_failed WHERE video_id = ?")
                    .bind(video_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("UPDATE video SET download_datetime = ? WHERE id = ?")
                    .bind(&now)
                    .bind(video_id)
                    .execute(&mut *tx)
                    .await?;
            }
            DownloadOutcome::Failed(reason) => {
                sqlx::query(
                    r#"
                    INSERT INTO download_failed (video_id, last_fail_datetime, error_text)
                    VALUES (?, ?, ?)
                    ON CONFLICT(video_id) DO UPDATE SET
                        last_fail_datetime = excluded.last_fail_datetime,
                        error_text = excluded.error_text
                    "#,
                )
                .bind(video_id)
                .bind(&now)
                .bind(reason)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        debug!(video_id, success = outcome.is_success(), "Download ended");
        Ok(())
    }

    async fn recover_interrupted_downloads(&self) -> Result<u64> {
        let claims: Vec<(i64, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT video_id, owner_pid, owner_started FROM download_in_progress",
        )
        .fetch_all(&self.pool)
        .await?;
        if claims.is_empty() {
            return Ok(0);
        }

        let mut system = System::new();
        let now = now_timestamp();
        let mut recovered = 0;
        let mut tx = self.pool.begin().await?;
        for (video_id, pid, started) in claims {
            let owner = pid
                .and_then(|pid| u32::try_from(pid).ok())
                .zip(started)
                .map(|(pid, started)| ProcessOwner { pid, started });
            if let Some(owner) = owner.filter(|o| o.is_alive_in(&mut system)) {
                info!(video_id, pid = owner.pid, "Download still owned by a running process");
                continue;
            }

            // Only remove the claim that was inspected
            let removed = sqlx::query(
                r#"
                DELETE FROM download_in_progress
                WHERE video_id = ? AND owner_pid IS ? AND owner_started IS ?
                "#,
            )
            .bind(video_id)
            .bind(pid)
            .bind(started)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if removed == 0 {
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO download_failed (video_id, last_fail_datetime, error_text)
                VALUES (?, ?, ?)
                ON CONFLICT(video_id) DO UPDATE SET
                    last_fail_datetime = excluded.last_fail_datetime,
                    error_text = excluded.error_text
                "#,
            )
            .bind(video_id)
            .bind(&now)
            .bind(INTERRUPTED_REASON)
            .execute(&mut *tx)
            .await?;
            recovered += removed;
        }
        tx.commit().await?;

        if recovered > 0 {
            warn!("{} download(s) were interrupted and marked as failed", recovered);
        }
        Ok(recovered)
    }

    async fn clear_download_queue(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_queued")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear_download_in_progress(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_in_progress")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl CatalogDb {
    // ===== Download queries =====

    /// Queued downloads, earliest eligible first
    pub async fn get_queued_downloads(&self, limit: i64) -> Result<Vec<VideoDetails>> {
        let videos = sqlx::query_as::<_, VideoDetails>(
            "SELECT * FROM video_details WHERE queued ORDER BY not_before, id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// Queued downloads whose `not_before` has passed
    pub async fn get_due_downloads(&self, limit: i64) -> Result<Vec<VideoDetails>> {
        let videos = sqlx::query_as::<_, VideoDetails>(
            r#"
            SELECT * FROM video_details
            WHERE queued AND not_before <= ?
            ORDER BY not_before, id
            LIMIT ?
            "#,
        )
        .bind(now_timestamp())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// Failed downloads, most recent failure first
    pub async fn get_failed_downloads(&self) -> Result<Vec<VideoDetails>> {
        let videos = sqlx::query_as::<_, VideoDetails>(
            "SELECT * FROM video_details WHERE failed ORDER BY last_fail_datetime DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// Videos ordered by most recent download
    pub async fn get_recent_downloads(&self, limit: i64) -> Result<Vec<VideoDetails>> {
        let videos = sqlx::query_as::<_, VideoDetails>(
            "SELECT * FROM video_details ORDER BY download_datetime DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    pub async fn get_download_state(&self, video_id: i64) -> Result<Option<DownloadState>> {
        Ok(self.get_video(video_id).await?.map(|v| v.download_state()))
    }
}
