//! Catalog storage using SQLite
//!
//! This module owns every persisted row:
//! - Extractors (the site a record came from)
//! - Collections (channels and playlists)
//! - Videos and their owner/membership cross-references
//! - Transient download state (see [`downloads`])
//!
//! Inserts are conflict-tolerant and followed by a reread, so two workers
//! racing on the same natural key observe the same id.

mod downloads;
mod models;
mod owner;
mod schema;

pub use downloads::*;
pub use models::*;
pub use owner::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::{parse_upload_date, NormalizedInfo};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Format string returned for unknown format ids
pub const DEFAULT_FORMAT: &str = "best";

/// Render a timestamp the way the catalog stores it
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Lookup and insert operations over extractors, collections and videos
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_extractor_by_name(&self, name: &str) -> Result<Option<Extractor>>;

    /// Insert the extractor if absent and return its id
    async fn insert_extractor(&self, name: &str, alt_name: Option<&str>) -> Result<i64>;

    async fn find_collection_by_extractor_id(
        &self,
        extractor_name: &str,
        online_id: &str,
        collection_type: CollectionType,
    ) -> Result<Option<Collection>>;

    /// Insert the channel or playlist described by `info` if absent and
    /// return its id. Channels are keyed on the uploader id, playlists on
    /// the record's own id.
    async fn insert_collection(
        &self,
        info: &NormalizedInfo,
        collection_type: CollectionType,
    ) -> Result<i64>;

    /// Insert a video row. `info.filepath` must already hold the rendered
    /// destination.
    async fn insert_video(&self, info: &NormalizedInfo, format_id: i64) -> Result<i64>;

    /// Most recently downloaded video with this natural key
    async fn find_video_by_extractor_id(
        &self,
        extractor_name: &str,
        online_id: &str,
    ) -> Result<Option<Video>>;

    async fn insert_video_owner_xref(&self, video_id: i64, collection_id: i64) -> Result<()>;

    /// Upsert playlist memberships, replacing the ordering index of existing pairs
    async fn insert_video_collection_xref(
        &self,
        videos: VideoRefs<'_>,
        collection_id: i64,
        indices: OrderingIndices<'_>,
    ) -> Result<()>;

    async fn mark_file_status(&self, video_id: i64, is_present: bool) -> Result<()>;

    /// Format string for `format_id`, falling back to [`DEFAULT_FORMAT`]
    async fn get_format(&self, format_id: i64) -> Result<String>;
}

/// Catalog database handle
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl CatalogDb {
    /// Connect to the catalog database named in the configuration
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file, 5).await
    }

    /// Open a database file with a pool of at most `max_connections`,
    /// creating the file and schema if needed
    pub async fn open(db_path: &Path, max_connections: u32) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create or upgrade the schema; safe to run repeatedly
    pub async fn init_schema(&self) -> Result<()> {
        debug!("Ensuring catalog schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='video'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ===== Read projections =====

    /// Get extractor by ID
    pub async fn get_extractor(&self, id: i64) -> Result<Option<Extractor>> {
        let extractor = sqlx::query_as::<_, Extractor>("SELECT * FROM extractor WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(extractor)
    }

    /// Get video details by ID
    pub async fn get_video(&self, id: i64) -> Result<Option<VideoDetails>> {
        let video = sqlx::query_as::<_, VideoDetails>("SELECT * FROM video_details WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    /// Get video details by natural key
    pub async fn get_video_by_extractor_id(
        &self,
        extractor_name: &str,
        online_id: &str,
    ) -> Result<Option<VideoDetails>> {
        let video = sqlx::query_as::<_, VideoDetails>(
            r#"
            SELECT * FROM video_details
            WHERE extractor_name = ? AND online_id = ?
            ORDER BY download_datetime DESC
            LIMIT 1
            "#,
        )
        .bind(extractor_name)
        .bind(online_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(video)
    }

    /// Get collection details by ID
    pub async fn get_collection(&self, id: i64) -> Result<Option<CollectionDetails>> {
        let collection = sqlx::query_as::<_, CollectionDetails>(
            "SELECT * FROM collection_details WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(collection)
    }

    /// Get collection details by natural key
    pub async fn get_collection_by_extractor_id(
        &self,
        extractor_name: &str,
        online_id: &str,
        collection_type: CollectionType,
    ) -> Result<Option<CollectionDetails>> {
        let collection = sqlx::query_as::<_, CollectionDetails>(
            r#"
            SELECT * FROM collection_details
            WHERE extractor_name = ? AND online_id = ? AND type_id = ?
            "#,
        )
        .bind(extractor_name)
        .bind(online_id)
        .bind(collection_type.id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(collection)
    }

    /// Owner channel and playlist memberships of a video
    pub async fn get_collections_by_video(
        &self,
        video_id: i64,
    ) -> Result<Vec<CollectionMembership>> {
        let memberships = sqlx::query_as::<_, CollectionMembership>(
            r#"
            SELECT c.id AS collection_id, c.online_id, c.online_title, c.type_id,
                   -1 AS ordering_index
            FROM video_owner_xref o
            JOIN collection c ON c.id = o.collection_id
            WHERE o.video_id = ?
            UNION ALL
            SELECT c.id AS collection_id, c.online_id, c.online_title, c.type_id,
                   x.ordering_index
            FROM video_collection_xref x
            JOIN collection c ON c.id = x.collection_id
            WHERE x.video_id = ?
            ORDER BY type_id, collection_id
            "#,
        )
        .bind(video_id)
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }

    /// Videos in a playlist, by position
    pub async fn get_collection_videos(&self, collection_id: i64) -> Result<Vec<VideoDetails>> {
        let videos = sqlx::query_as::<_, VideoDetails>(
            r#"
            SELECT d.* FROM video_details d
            JOIN video_collection_xref x ON x.video_id = d.id
            WHERE x.collection_id = ?
            ORDER BY x.ordering_index, d.id
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }

    /// All selectable formats grouped by category
    pub async fn get_format_options(&self) -> Result<BTreeMap<String, Vec<FormatOption>>> {
        let options = sqlx::query_as::<_, FormatOption>(
            r#"
            SELECT f.id, c.name AS category, f.label, f.value
            FROM format f
            JOIN format_category c ON c.id = f.category_id
            ORDER BY c.id, f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<String, Vec<FormatOption>> = BTreeMap::new();
        for option in options {
            grouped.entry(option.category.clone()).or_default().push(option);
        }
        Ok(grouped)
    }

    // ===== Statistics =====

    /// Row counts across the catalog
    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        Ok(CatalogStats {
            extractor_count: self.count_rows("extractor").await?,
            collection_count: self.count_rows("collection").await?,
            video_count: self.count_rows("video").await?,
            queued_count: self.count_rows("download_queued").await?,
            in_progress_count: self.count_rows("download_in_progress").await?,
            failed_count: self.count_rows("download_failed").await?,
        })
    }

    async fn count_rows(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as usize)
    }
}

#[async_trait]
impl CatalogStore for CatalogDb {
    async fn find_extractor_by_name(&self, name: &str) -> Result<Option<Extractor>> {
        let extractor = sqlx::query_as::<_, Extractor>("SELECT * FROM extractor WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(extractor)
    }

    async fn insert_extractor(&self, name: &str, alt_name: Option<&str>) -> Result<i64> {
        sqlx::query("INSERT INTO extractor (name, alt_name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .bind(alt_name)
            .execute(&self.pool)
            .await?;

        let extractor = self
            .find_extractor_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFoundAfterInsert(format!("extractor '{}'", name)))?;
        Ok(extractor.id)
    }

    async fn find_collection_by_extractor_id(
        &self,
        extractor_name: &str,
        online_id: &str,
        collection_type: CollectionType,
    ) -> Result<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(
            r#"
            SELECT c.* FROM collection c
            JOIN extractor e ON e.id = c.extractor_id
            WHERE e.name = ? AND c.online_id = ? AND c.type_id = ?
            "#,
        )
        .bind(extractor_name)
        .bind(online_id)
        .bind(collection_type.id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(collection)
    }

    async fn insert_collection(
        &self,
        info: &NormalizedInfo,
        collection_type: CollectionType,
    ) -> Result<i64> {
        let (online_id, title, url) = match collection_type {
            CollectionType::Channel => (
                info.uploader_id.as_str(),
                Some(info.uploader.as_str()),
                info.uploader_url.as_deref(),
            ),
            CollectionType::Playlist => (
                info.id.as_str(),
                Some(info.title.as_str()),
                info.webpage_url.as_deref(),
            ),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO collection (online_id, online_title, url, type_id, extractor_id, created_at)
            VALUES (?, ?, ?, ?, (SELECT id FROM extractor WHERE name = ?), ?)
            ON CONFLICT(extractor_id, online_id, type_id) DO NOTHING
            "#,
        )
        .bind(online_id)
        .bind(title)
        .bind(url)
        .bind(collection_type.id())
        .bind(&info.extractor_key)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("Inserted {} '{}'", collection_type, online_id);
        }

        let collection = self
            .find_collection_by_extractor_id(&info.extractor_key, online_id, collection_type)
            .await?
            .ok_or_else(|| {
                Error::NotFoundAfterInsert(format!("{} '{}'", collection_type, online_id))
            })?;
        Ok(collection.id)
    }

    async fn insert_video(&self, info: &NormalizedInfo, format_id: i64) -> Result<i64> {
        let filepath = info.filepath.as_deref().ok_or_else(|| {
            Error::InvalidArguments(format!(
                "no destination computed for {}",
                info.pretty_name()
            ))
        })?;
        let upload_date = info.upload_date.as_deref().and_then(parse_upload_date);

        let result = sqlx::query(
            r#"
            INSERT INTO video (online_id, extractor_id, url, title, format_id, duration_s,
                               upload_date, filepath, download_datetime)
            VALUES (?, (SELECT id FROM extractor WHERE name = ?), ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(extractor_id, online_id) DO NOTHING
            "#,
        )
        .bind(&info.id)
        .bind(&info.extractor_key)
        .bind(&info.webpage_url)
        .bind(&info.title)
        .bind(format_id)
        .bind(info.duration_secs())
        .bind(upload_date)
        .bind(filepath)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                "Video {} was inserted concurrently, reusing existing row",
                info.pretty_name()
            );
        }

        let video = self
            .find_video_by_extractor_id(&info.extractor_key, &info.id)
            .await?
            .ok_or_else(|| Error::NotFoundAfterInsert(format!("video {}", info.pretty_name())))?;
        Ok(video.id)
    }

    async fn find_video_by_extractor_id(
        &self,
        extractor_name: &str,
        online_id: &str,
    ) -> Result<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(
            r#"
            SELECT v.* FROM video v
            JOIN extractor e ON e.id = v.extractor_id
            WHERE e.name = ? AND v.online_id = ?
            ORDER BY v.download_datetime DESC
            LIMIT 1
            "#,
        )
        .bind(extractor_name)
        .bind(online_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(video)
    }

    async fn insert_video_owner_xref(&self, video_id: i64, collection_id: i64) -> Result<()> {
        // The primary key on video_id keeps a single owner even when two
        // workers created the same video
        sqlx::query(
            r#"
            INSERT INTO video_owner_xref (video_id, collection_id) VALUES (?, ?)
            ON CONFLICT(video_id) DO NOTHING
            "#,
        )
        .bind(video_id)
        .bind(collection_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_video_collection_xref(
        &self,
        videos: VideoRefs<'_>,
        collection_id: i64,
        indices: OrderingIndices<'_>,
    ) -> Result<()> {
        let pairs = pair_xrefs(videos, indices)?;
        if pairs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (video_id, ordering_index) in &pairs {
            sqlx::query(
                r#"
                INSERT INTO video_collection_xref (video_id, collection_id, ordering_index)
                VALUES (?, ?, ?)
                ON CONFLICT(video_id, collection_id) DO UPDATE SET
                    ordering_index = excluded.ordering_index
                "#,
            )
            .bind(video_id)
            .bind(collection_id)
            .bind(ordering_index)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(
            "Linked {} video(s) to collection {}",
            pairs.len(),
            collection_id
        );
        Ok(())
    }

    async fn mark_file_status(&self, video_id: i64, is_present: bool) -> Result<()> {
        sqlx::query(
            "UPDATE video SET filepath_exists = ?, filepath_last_checked = ? WHERE id = ?",
        )
        .bind(is_present)
        .bind(now_timestamp())
        .bind(video_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_format(&self, format_id: i64) -> Result<String> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM format WHERE id = ?")
            .bind(format_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.unwrap_or_else(|| {
            debug!("Unknown format id {}, using '{}'", format_id, DEFAULT_FORMAT);
            DEFAULT_FORMAT.to_string()
        }))
    }
}

/// Open an existing catalog, reconciling downloads interrupted by a
/// previous crash before anything else touches it
pub async fn open_and_recover(db_path: &Path) -> Result<CatalogDb> {
    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    let db = CatalogDb::open(db_path, 5).await?;
    db.recover_interrupted_downloads().await?;
    Ok(db)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metadata::{normalize, MetadataRecord};
    use serde_json::json;
    use tempfile::TempDir;

    pub(crate) async fn setup_test_db() -> (CatalogDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = CatalogDb::connect(&config).await.unwrap();
        (db, tmp)
    }

    pub(crate) fn sample_info(online_id: &str) -> NormalizedInfo {
        let record: MetadataRecord = serde_json::from_value(json!({
            "id": online_id,
            "title": format!("Video {}", online_id),
            "extractor": "youtube",
            "extractor_key": "Youtube",
            "uploader": "Uploader",
            "uploader_id": "abc",
            "webpage_url": format!("https://example.com/watch?v={}", online_id),
            "upload_date": "20230115",
            "duration": 90.4,
            "ext": "mp4"
        }))
        .unwrap();
        let mut info = normalize(record);
        info.filepath = Some(format!("/downloads/{}.mp4", online_id));
        info
    }

    /// Insert extractor, owner channel and video the way ingestion does
    pub(crate) async fn insert_sample_video(db: &CatalogDb, online_id: &str) -> i64 {
        let info = sample_info(online_id);
        db.insert_extractor(&info.extractor_key, Some(&info.extractor))
            .await
            .unwrap();
        let channel = db
            .insert_collection(&info, CollectionType::Channel)
            .await
            .unwrap();
        let video_id = db.insert_video(&info, 1).await.unwrap();
        db.insert_video_owner_xref(video_id, channel).await.unwrap();
        video_id
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.is_initialized().await.unwrap());
        db.init_schema().await.unwrap();

        let types: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collection_type")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(types, 2);
    }

    #[tokio::test]
    async fn test_extractor_insert_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;

        let first = db.insert_extractor("Youtube", Some("youtube")).await.unwrap();
        let second = db.insert_extractor("Youtube", Some("other")).await.unwrap();
        assert_eq!(first, second);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM extractor WHERE name = ?")
            .bind("Youtube")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let found = db.find_extractor_by_name("Youtube").await.unwrap().unwrap();
        assert_eq!(found.alt_name.as_deref(), Some("youtube"));
        assert!(db.find_extractor_by_name("Vimeo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_insert_first_wins() {
        let (db, _tmp) = setup_test_db().await;
        let mut info = sample_info("v1");
        db.insert_extractor(&info.extractor_key, None).await.unwrap();

        let first = db
            .insert_collection(&info, CollectionType::Channel)
            .await
            .unwrap();
        info.uploader = "Renamed".to_string();
        let second = db
            .insert_collection(&info, CollectionType::Channel)
            .await
            .unwrap();
        assert_eq!(first, second);

        let channel = db
            .find_collection_by_extractor_id("Youtube", "abc", CollectionType::Channel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.online_title.as_deref(), Some("Uploader"));
        assert_eq!(channel.get_type().unwrap(), CollectionType::Channel);

        // Same online id as a playlist is a distinct collection
        assert!(db
            .find_collection_by_extractor_id("Youtube", "abc", CollectionType::Playlist)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_lookups_by_id_and_natural_key() {
        let (db, _tmp) = setup_test_db().await;
        let video_id = insert_sample_video(&db, "v1").await;
        let video = db.get_video(video_id).await.unwrap().unwrap();

        let extractor = db.get_extractor(video.extractor_id).await.unwrap().unwrap();
        assert_eq!(extractor.name, "Youtube");
        assert_eq!(extractor.alt_name.as_deref(), Some("youtube"));
        assert!(db.get_extractor(extractor.id + 100).await.unwrap().is_none());

        let channel = db
            .get_collection_by_extractor_id("Youtube", "abc", CollectionType::Channel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.type_name, "Channel");
        assert_eq!(channel.extractor_name, "Youtube");
        assert_eq!(channel.owned_video_count, 1);
        assert!(db
            .get_collection_by_extractor_id("Youtube", "abc", CollectionType::Playlist)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .get_collection_by_extractor_id("Vimeo", "abc", CollectionType::Channel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_video_natural_key_is_unique() {
        let (db, _tmp) = setup_test_db().await;
        let first = insert_sample_video(&db, "v1").await;
        let second = db.insert_video(&sample_info("v1"), 1).await.unwrap();
        assert_eq!(first, second);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_insert_video_requires_filepath() {
        let (db, _tmp) = setup_test_db().await;
        let mut info = sample_info("v1");
        info.filepath = None;
        db.insert_extractor(&info.extractor_key, None).await.unwrap();
        assert!(matches!(
            db.insert_video(&info, 1).await,
            Err(Error::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_date_round_trip() {
        let (db, _tmp) = setup_test_db().await;
        let video_id = insert_sample_video(&db, "v1").await;

        let video = db.get_video(video_id).await.unwrap().unwrap();
        assert_eq!(
            video.upload_date,
            chrono::NaiveDate::from_ymd_opt(2023, 1, 15)
        );
        assert_eq!(video.duration_s, Some(90));
        assert_eq!(video.filepath, "/downloads/v1.mp4");
        assert_eq!(video.owner_title.as_deref(), Some("Uploader"));
        assert_eq!(video.download_state(), DownloadState::None);

        let mut info = sample_info("v2");
        info.upload_date = None;
        let id = db.insert_video(&info, 1).await.unwrap();
        let stored: Option<String> = sqlx::query_scalar("SELECT upload_date FROM video WHERE id = ?")
            .bind(id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_playlist_ordering_update() {
        let (db, _tmp) = setup_test_db().await;
        let ids = vec![
            insert_sample_video(&db, "a").await,
            insert_sample_video(&db, "b").await,
            insert_sample_video(&db, "c").await,
        ];
        let mut playlist = sample_info("PL1");
        playlist.title = "Playlist".to_string();
        let playlist_id = db
            .insert_collection(&playlist, CollectionType::Playlist)
            .await
            .unwrap();

        db.insert_video_collection_xref(
            VideoRefs::Many(&ids),
            playlist_id,
            OrderingIndices::Many(&[1, 2, 3]),
        )
        .await
        .unwrap();
        db.insert_video_collection_xref(
            VideoRefs::One(ids[1]),
            playlist_id,
            OrderingIndices::One(5),
        )
        .await
        .unwrap();

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT video_id, ordering_index FROM video_collection_xref WHERE collection_id = ? ORDER BY video_id",
        )
        .bind(playlist_id)
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(rows, vec![(ids[0], 1), (ids[1], 5), (ids[2], 3)]);

        let details = db.get_collection(playlist_id).await.unwrap().unwrap();
        assert_eq!(details.member_video_count, 3);
        assert_eq!(details.type_name, "Playlist");

        let ordered = db.get_collection_videos(playlist_id).await.unwrap();
        let order: Vec<i64> = ordered.iter().map(|v| v.id).collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[1]]);
    }

    #[tokio::test]
    async fn test_batch_length_mismatch_writes_nothing() {
        let (db, _tmp) = setup_test_db().await;
        let ids = vec![
            insert_sample_video(&db, "a").await,
            insert_sample_video(&db, "b").await,
            insert_sample_video(&db, "c").await,
        ];
        let playlist_id = db
            .insert_collection(&sample_info("PL1"), CollectionType::Playlist)
            .await
            .unwrap();

        let result = db
            .insert_video_collection_xref(
                VideoRefs::Many(&ids),
                playlist_id,
                OrderingIndices::Many(&[1, 2]),
            )
            .await;
        assert!(matches!(result, Err(Error::LengthMismatch { .. })));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video_collection_xref")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_mark_file_status() {
        let (db, _tmp) = setup_test_db().await;
        let video_id = insert_sample_video(&db, "v1").await;

        db.mark_file_status(video_id, true).await.unwrap();
        let video = db
            .find_video_by_extractor_id("Youtube", "v1")
            .await
            .unwrap()
            .unwrap();
        assert!(video.filepath_exists);
        assert!(video.filepath_last_checked.is_some());

        // Unknown ids are a no-op
        db.mark_file_status(9999, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_collections_by_video() {
        let (db, _tmp) = setup_test_db().await;
        let video_id = insert_sample_video(&db, "v1").await;
        let playlist_id = db
            .insert_collection(&sample_info("PL1"), CollectionType::Playlist)
            .await
            .unwrap();
        db.insert_video_collection_xref(
            VideoRefs::One(video_id),
            playlist_id,
            OrderingIndices::One(4),
        )
        .await
        .unwrap();

        let memberships = db.get_collections_by_video(video_id).await.unwrap();
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].type_id, CollectionType::Channel.id());
        assert_eq!(memberships[0].ordering_index, ORDERING_SENTINEL);
        assert_eq!(memberships[1].collection_id, playlist_id);
        assert_eq!(memberships[1].ordering_index, 4);
    }

    #[tokio::test]
    async fn test_format_lookup() {
        let (db, _tmp) = setup_test_db().await;
        assert_eq!(db.get_format(1).await.unwrap(), "bestvideo+bestaudio/best");
        assert_eq!(db.get_format(424242).await.unwrap(), DEFAULT_FORMAT);

        let options = db.get_format_options().await.unwrap();
        assert!(options.contains_key("Video"));
        assert!(options.contains_key("Audio"));
        assert_eq!(options["Video"][0].id, 1);
    }

    #[tokio::test]
    async fn test_catalog_stats() {
        let (db, _tmp) = setup_test_db().await;
        insert_sample_video(&db, "a").await;
        insert_sample_video(&db, "b").await;

        let stats = db.catalog_stats().await.unwrap();
        assert_eq!(stats.extractor_count, 1);
        assert_eq!(stats.collection_count, 1);
        assert_eq!(stats.video_count, 2);
        assert_eq!(stats.queued_count, 0);
    }

    #[tokio::test]
    async fn test_open_and_recover() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("catalog.db");
        assert!(matches!(
            open_and_recover(&db_path).await,
            Err(Error::NotInitialized)
        ));

        let db = CatalogDb::open(&db_path, 1).await.unwrap();
        let video_id = insert_sample_video(&db, "v1").await;
        // Claimed by an earlier process that reused this pid
        let current = ProcessOwner::current();
        sqlx::query(
            r#"
            INSERT INTO download_in_progress (video_id, start_datetime, owner_pid, owner_started)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(video_id)
        .bind(now_timestamp())
        .bind(i64::from(current.pid))
        .bind(current.started - 1)
        .execute(&db.pool)
        .await
        .unwrap();
        db.close().await;

        let db = open_and_recover(&db_path).await.unwrap();
        let video = db.get_video(video_id).await.unwrap().unwrap();
        assert_eq!(video.download_state(), DownloadState::Failed);
        assert_eq!(video.error_text.as_deref(), Some(INTERRUPTED_REASON));
    }
}
