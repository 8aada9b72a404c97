//! Ingestion: metadata record in, catalog rows and a best-effort download out
//!
//! A record is either a single video or a container of videos. Videos are
//! looked up by `(extractor, online id)` first so a file already on disk is
//! never fetched twice.

use crate::catalog::{
    CatalogStore, CollectionType, DownloadOutcome, DownloadTracker, OrderingIndices, VideoRefs,
};
use crate::error::{Error, Result};
use crate::fetch::{FetchOptions, FileFetcher, MetadataExtractor};
use crate::metadata::{normalize, MetadataRecord, RecordKind};
use crate::template;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-request options
#[derive(Debug, Clone, Serialize)]
pub struct RequestOptions {
    /// Id of the row in the format table
    pub format_id: i64,
}

impl RequestOptions {
    pub fn with_format(format_id: i64) -> Self {
        Self { format_id }
    }
}

/// Result of ingesting a single video
#[derive(Debug, Clone, Serialize)]
pub struct VideoOutcome {
    pub video_id: i64,
    pub title: String,
    pub filepath: String,
    /// A new catalog row was created
    pub created: bool,
    /// The fetcher was invoked
    pub fetched: bool,
    pub file_present: bool,
    /// Download failure reason
    pub error: Option<String>,
}

/// A video placed in a playlist
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEntry {
    pub video_id: i64,
    pub position: i64,
}

/// Result of ingesting a container record
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistOutcome {
    pub collection_id: i64,
    pub title: String,
    pub entries: Vec<PlaylistEntry>,
    /// Items that could not be ingested; the rest still were
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IngestOutcome {
    Video(VideoOutcome),
    Playlist(PlaylistOutcome),
}

impl IngestOutcome {
    /// Video id or collection id
    pub fn id(&self) -> i64 {
        match self {
            IngestOutcome::Video(v) => v.video_id,
            IngestOutcome::Playlist(p) => p.collection_id,
        }
    }
}

/// Drives the catalog, the download tracker and the fetcher for one record
pub struct Ingestor<C> {
    catalog: C,
    fetcher: Arc<dyn FileFetcher>,
    output_template: String,
    download_dir: PathBuf,
}

impl<C> Ingestor<C>
where
    C: CatalogStore + DownloadTracker,
{
    pub fn new(
        catalog: C,
        fetcher: Arc<dyn FileFetcher>,
        output_template: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            output_template: output_template.into(),
            download_dir: download_dir.into(),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Extract metadata for `url` and ingest it
    pub async fn process_url(
        &self,
        extractor: &dyn MetadataExtractor,
        url: &str,
        options: &RequestOptions,
    ) -> Result<IngestOutcome> {
        let record = extractor.extract(url).await?;
        self.process(record, options).await
    }

    /// Ingest a record, dispatching on its type discriminator
    pub async fn process(
        &self,
        record: MetadataRecord,
        options: &RequestOptions,
    ) -> Result<IngestOutcome> {
        match record.kind() {
            RecordKind::Video => Ok(IngestOutcome::Video(
                self.process_video(record, options).await?,
            )),
            kind if kind.is_container() => Ok(IngestOutcome::Playlist(
                self.process_playlist(record, options).await?,
            )),
            other => Err(Error::UnsupportedContainerType(other.to_string())),
        }
    }

    /// Download a queued video again, re-extracting from its stored URL.
    ///
    /// The video leaves the queue whatever happens. Extraction errors, and
    /// re-extractions that come back as some other record, are recorded as
    /// a failed download.
    pub async fn process_queued(
        &self,
        extractor: &dyn MetadataExtractor,
        video_id: i64,
        url: &str,
        options: &RequestOptions,
    ) -> Result<IngestOutcome> {
        let result = self.process_url(extractor, url, options).await;
        let ended = match &result {
            Err(e) => Some(DownloadOutcome::Failed(e.to_string())),
            Ok(IngestOutcome::Video(v)) if v.video_id == video_id => {
                // A fetch ends itself; a busy video is left to its owner
                (!v.fetched && v.file_present).then_some(DownloadOutcome::Succeeded)
            }
            Ok(_) => Some(DownloadOutcome::Failed(format!(
                "Re-extraction did not yield video {}",
                video_id
            ))),
        };
        if let Some(outcome) = ended {
            self.catalog.mark_download_ended(video_id, &outcome).await?;
        }
        result
    }

    async fn process_playlist(
        &self,
        mut record: MetadataRecord,
        options: &RequestOptions,
    ) -> Result<PlaylistOutcome> {
        let entries = record.entries.take().unwrap_or_default();
        let info = normalize(record);

        self.catalog
            .insert_extractor(&info.extractor_key, Some(&info.extractor))
            .await?;
        let collection_id = self
            .catalog
            .insert_collection(&info, CollectionType::Playlist)
            .await?;
        info!(
            "Processing {} with {} entries",
            info.pretty_name(),
            entries.len()
        );

        let mut video_ids = Vec::with_capacity(entries.len());
        let mut positions = Vec::with_capacity(entries.len());
        let mut errors = Vec::new();

        for (i, entry) in entries.into_iter().enumerate() {
            let Some(mut entry) = entry else {
                errors.push(format!("Entry {}: unavailable", i + 1));
                continue;
            };
            let position = entry.playlist_index.unwrap_or(i as i64 + 1);

            let kind = entry.kind();
            if kind != RecordKind::Video {
                let err = Error::UnsupportedContainerType(kind.to_string());
                errors.push(format!("Entry {}: {}", i + 1, err));
                continue;
            }

            if entry.extractor.is_none() && entry.extractor_key.is_none() {
                entry.extractor = info.raw.extractor.clone();
                entry.extractor_key = info.raw.extractor_key.clone();
            }

            match self.process_video(entry, options).await {
                Ok(video) => {
                    if let Some(reason) = &video.error {
                        errors.push(format!("Entry {}: {}", i + 1, reason));
                    }
                    video_ids.push(video.video_id);
                    positions.push(position);
                }
                Err(e) => {
                    warn!("Entry {} of {} failed: {}", i + 1, info.pretty_name(), e);
                    errors.push(format!("Entry {}: {}", i + 1, e));
                }
            }
        }

        self.catalog
            .insert_video_collection_xref(
                VideoRefs::Many(&video_ids),
                collection_id,
                OrderingIndices::Many(&positions),
            )
            .await?;

        Ok(PlaylistOutcome {
            collection_id,
            title: info.title,
            entries: video_ids
                .into_iter()
                .zip(positions)
                .map(|(video_id, position)| PlaylistEntry { video_id, position })
                .collect(),
            errors,
        })
    }

    async fn process_video(
        &self,
        record: MetadataRecord,
        options: &RequestOptions,
    ) -> Result<VideoOutcome> {
        let mut info = normalize(record);

        let existing = self
            .catalog
            .find_video_by_extractor_id(&info.extractor_key, &info.id)
            .await?;

        let (video_id, filepath, created) = match existing {
            Some(video) => {
                let filepath = PathBuf::from(&video.filepath);
                let present = file_exists(&filepath).await;
                self.catalog.mark_file_status(video.id, present).await?;
                if present {
                    info!("Already downloaded: {}", info.pretty_name());
                    return Ok(VideoOutcome {
                        video_id: video.id,
                        title: video.title,
                        filepath: video.filepath,
                        created: false,
                        fetched: false,
                        file_present: true,
                        error: None,
                    });
                }
                debug!("File missing for {}, downloading again", info.pretty_name());
                (video.id, filepath, false)
            }
            None => {
                self.catalog
                    .insert_extractor(&info.extractor_key, Some(&info.extractor))
                    .await?;
                let channel_id = self
                    .catalog
                    .insert_collection(&info, CollectionType::Channel)
                    .await?;

                let filepath =
                    template::destination(&self.download_dir, &self.output_template, &info);
                info.filepath = Some(filepath.to_string_lossy().into_owned());

                let video_id = self.catalog.insert_video(&info, options.format_id).await?;
                self.catalog
                    .insert_video_owner_xref(video_id, channel_id)
                    .await?;
                (video_id, filepath, true)
            }
        };

        let format = self.catalog.get_format(options.format_id).await?;
        let attempt = self
            .download(video_id, &info.raw, format, &filepath)
            .await?;

        let (fetched, error) = match attempt {
            Attempt::Busy => {
                info!("{} is being downloaded elsewhere", info.pretty_name());
                return Ok(VideoOutcome {
                    video_id,
                    title: info.title,
                    filepath: filepath.to_string_lossy().into_owned(),
                    created,
                    fetched: false,
                    file_present: false,
                    error: None,
                });
            }
            Attempt::AlreadyPresent => {
                info!("Already downloaded: {}", info.pretty_name());
                (false, None)
            }
            Attempt::Fetched(DownloadOutcome::Succeeded) => {
                info!("Downloaded {}", info.pretty_name());
                (true, None)
            }
            Attempt::Fetched(DownloadOutcome::Failed(reason)) => {
                warn!("Download of {} failed: {}", info.pretty_name(), reason);
                (true, Some(reason))
            }
        };
        let present = file_exists(&filepath).await;
        self.catalog.mark_file_status(video_id, present).await?;

        Ok(VideoOutcome {
            video_id,
            title: info.title,
            filepath: filepath.to_string_lossy().into_owned(),
            created,
            fetched,
            file_present: present,
            error,
        })
    }

    /// Run one fetch bracketed by the in-progress state.
    ///
    /// Nothing is fetched unless the claim succeeds. Success needs a zero
    /// return code and the file on disk.
    async fn download(
        &self,
        video_id: i64,
        record: &MetadataRecord,
        format: String,
        filepath: &Path,
    ) -> Result<Attempt> {
        if !self.catalog.mark_download_started(video_id).await? {
            return Ok(Attempt::Busy);
        }
        // The previous owner may have finished before the claim
        if file_exists(filepath).await {
            self.catalog
                .mark_download_ended(video_id, &DownloadOutcome::Succeeded)
                .await?;
            return Ok(Attempt::AlreadyPresent);
        }

        let options = FetchOptions {
            format,
            output_path: filepath.to_path_buf(),
        };
        let outcome = match self.fetcher.fetch(record, &options).await {
            Ok(result) => {
                let present = file_exists(filepath).await;
                match (result.return_code, present) {
                    (0, true) => DownloadOutcome::Succeeded,
                    (0, false) => DownloadOutcome::Failed(format!(
                        "Fetcher reported success but {} does not exist",
                        filepath.display()
                    )),
                    (code, _) => {
                        DownloadOutcome::Failed(format!("Fetcher exited with code {}", code))
                    }
                }
            }
            Err(e) => DownloadOutcome::Failed(e.to_string()),
        };

        self.catalog.mark_download_ended(video_id, &outcome).await?;
        Ok(Attempt::Fetched(outcome))
    }
}

enum Attempt {
    Fetched(DownloadOutcome),
    AlreadyPresent,
    /// Another worker or process holds the claim
    Busy,
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
