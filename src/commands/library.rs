//! Catalog lookups: videos, collections and formats

use crate::catalog::{
    CatalogDb, CatalogStore, CollectionDetails, CollectionMembership, CollectionType,
    DownloadState, FormatOption, VideoDetails,
};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// How a video is addressed on the command line
#[derive(Debug, Clone)]
pub enum VideoLookup {
    Id(i64),
    Natural { extractor: String, online_id: String },
}

/// A video with its download state and collection memberships
#[derive(Debug, Clone, Serialize)]
pub struct VideoReport {
    pub video: VideoDetails,
    pub state: DownloadState,
    pub collections: Vec<CollectionMembership>,
}

/// A collection with the videos it contains
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub collection: CollectionDetails,
    pub videos: Vec<VideoDetails>,
}

/// Look up a video, refreshing whether its file is still on disk
pub async fn cmd_video(db: &CatalogDb, lookup: VideoLookup) -> Result<VideoReport> {
    let found = match &lookup {
        VideoLookup::Id(id) => db.get_video(*id).await?,
        VideoLookup::Natural {
            extractor,
            online_id,
        } => db.get_video_by_extractor_id(extractor, online_id).await?,
    };
    let video = found.ok_or_else(|| Error::VideoNotFound(lookup.to_string()))?;

    let present = tokio::fs::try_exists(Path::new(&video.filepath))
        .await
        .unwrap_or(false);
    db.mark_file_status(video.id, present).await?;

    let video = db
        .get_video(video.id)
        .await?
        .ok_or_else(|| Error::VideoNotFound(video.id.to_string()))?;
    let collections = db.get_collections_by_video(video.id).await?;

    Ok(VideoReport {
        state: video.download_state(),
        video,
        collections,
    })
}

/// Look up a collection and its member videos
pub async fn cmd_collection(db: &CatalogDb, id: i64) -> Result<CollectionReport> {
    let collection = db
        .get_collection(id)
        .await?
        .ok_or_else(|| Error::CollectionNotFound(id.to_string()))?;
    let videos = db.get_collection_videos(id).await?;
    Ok(CollectionReport { collection, videos })
}

pub async fn cmd_formats(db: &CatalogDb) -> Result<BTreeMap<String, Vec<FormatOption>>> {
    db.get_format_options().await
}

impl std::fmt::Display for VideoLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoLookup::Id(id) => write!(f, "{}", id),
            VideoLookup::Natural {
                extractor,
                online_id,
            } => write!(f, "{}:{}", extractor, online_id),
        }
    }
}

/// Print a video report to console
pub fn print_video(report: &VideoReport) {
    let video = &report.video;
    println!("\n🎬 {}\n", video.title);
    println!("ID: {} ({} {})", video.id, video.extractor_name, video.online_id);
    if let Some(url) = &video.url {
        println!("URL: {}", url);
    }
    if let Some(owner) = &video.owner_title {
        println!("Channel: {}", owner);
    }
    if let Some(date) = video.upload_date {
        println!("Uploaded: {}", date);
    }
    if let Some(duration) = video.duration_s {
        println!("Duration: {}:{:02}", duration / 60, duration % 60);
    }
    if let Some(label) = &video.format_label {
        println!("Format: {}", label);
    }

    let file_status = if video.filepath_exists { "✓" } else { "✗ missing" };
    println!("File: {} {}", video.filepath, file_status);
    println!("Download: {}", report.state);
    if let Some(error) = &video.error_text {
        println!("  Last error: {}", error);
    }

    let playlists: Vec<_> = report
        .collections
        .iter()
        .filter(|c| c.type_id == CollectionType::Playlist.id())
        .collect();
    if !playlists.is_empty() {
        println!("\nPlaylists:");
        for membership in playlists {
            println!(
                "  • [{}] {} (#{})",
                membership.collection_id,
                membership.online_title.as_deref().unwrap_or(&membership.online_id),
                membership.ordering_index
            );
        }
    }
}

/// Print a collection report to console
pub fn print_collection(report: &CollectionReport) {
    let collection = &report.collection;
    let title = collection
        .custom_title
        .as_deref()
        .or(collection.online_title.as_deref())
        .unwrap_or(&collection.online_id);

    println!("\n📂 {} [{}]\n", title, collection.type_name);
    println!("ID: {} ({} {})", collection.id, collection.extractor_name, collection.online_id);
    if let Some(url) = &collection.url {
        println!("URL: {}", url);
    }
    println!(
        "Videos: {} owned, {} listed",
        collection.owned_video_count, collection.member_video_count
    );

    if !report.videos.is_empty() {
        println!();
        for video in &report.videos {
            println!("  • [{}] {} ({})", video.id, video.title, video.download_state());
        }
    }
}

/// Print format options grouped by category
pub fn print_formats(formats: &BTreeMap<String, Vec<FormatOption>>) {
    println!("\n🎞 Formats\n");
    for (category, options) in formats {
        println!("{}:", category);
        for option in options {
            println!("  {:>3}  {:<24} {}", option.id, option.label, option.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{insert_sample_video, sample_info, setup_test_db};
    use crate::catalog::{OrderingIndices, VideoRefs};

    #[tokio::test]
    async fn test_video_lookup_refreshes_file_status() {
        let (db, _tmp) = setup_test_db().await;
        let id = insert_sample_video(&db, "v1").await;
        db.mark_file_status(id, true).await.unwrap();

        let report = cmd_video(&db, VideoLookup::Id(id)).await.unwrap();
        assert!(!report.video.filepath_exists);
        assert!(report.video.filepath_last_checked.is_some());
        assert_eq!(report.state, DownloadState::None);
        assert_eq!(report.collections.len(), 1);
    }

    #[tokio::test]
    async fn test_video_lookup_by_natural_key() {
        let (db, _tmp) = setup_test_db().await;
        let id = insert_sample_video(&db, "v1").await;

        let report = cmd_video(
            &db,
            VideoLookup::Natural {
                extractor: "Youtube".to_string(),
                online_id: "v1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(report.video.id, id);

        let missing = cmd_video(
            &db,
            VideoLookup::Natural {
                extractor: "Youtube".to_string(),
                online_id: "nope".to_string(),
            },
        )
        .await;
        assert!(matches!(missing, Err(Error::VideoNotFound(key)) if key == "Youtube:nope"));
    }

    #[tokio::test]
    async fn test_collection_lists_videos_in_order() {
        let (db, _tmp) = setup_test_db().await;
        let a = insert_sample_video(&db, "a").await;
        let b = insert_sample_video(&db, "b").await;
        let mut playlist = sample_info("PL1");
        playlist.title = "Mix".to_string();
        let collection_id = db
            .insert_collection(&playlist, CollectionType::Playlist)
            .await
            .unwrap();
        db.insert_video_collection_xref(
            VideoRefs::Many(&[a, b]),
            collection_id,
            OrderingIndices::Many(&[2, 1]),
        )
        .await
        .unwrap();

        let report = cmd_collection(&db, collection_id).await.unwrap();
        assert_eq!(report.collection.member_video_count, 2);
        let ids: Vec<i64> = report.videos.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![b, a]);

        assert!(matches!(
            cmd_collection(&db, 999).await,
            Err(Error::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_formats_grouped_by_category() {
        let (db, _tmp) = setup_test_db().await;
        let formats = cmd_formats(&db).await.unwrap();
        assert!(formats.contains_key("Video"));
        assert!(formats.contains_key("Audio"));
        assert_eq!(formats["Video"][0].value, "bestvideo+bestaudio/best");
    }
}
