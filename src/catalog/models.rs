//! Row types and argument types for the catalog

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Ordering index stored for memberships without a meaningful position
pub const ORDERING_SENTINEL: i64 = -1;

/// Kind of video grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Channel,
    Playlist,
}

impl CollectionType {
    /// Id of the matching `collection_type` row
    pub fn id(self) -> i64 {
        match self {
            CollectionType::Channel => 1,
            CollectionType::Playlist => 2,
        }
    }

    pub fn from_id(id: i64) -> Result<Self> {
        match id {
            1 => Ok(CollectionType::Channel),
            2 => Ok(CollectionType::Playlist),
            other => Err(Error::InvalidCollectionType(other.to_string())),
        }
    }
}

impl std::fmt::Display for CollectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionType::Channel => write!(f, "channel"),
            CollectionType::Playlist => write!(f, "playlist"),
        }
    }
}

impl FromStr for CollectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "channel" => Ok(CollectionType::Channel),
            "playlist" => Ok(CollectionType::Playlist),
            _ => Err(Error::InvalidCollectionType(s.to_string())),
        }
    }
}

/// The site or service a record was extracted from
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Extractor {
    pub id: i64,
    pub name: String,
    pub alt_name: Option<String>,
}

/// A channel or playlist
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub online_id: String,
    pub online_title: Option<String>,
    pub custom_title: Option<String>,
    pub url: Option<String>,
    pub type_id: i64,
    pub extractor_id: i64,
    pub update_schedule: Option<String>,
    pub created_at: String,
}

impl Collection {
    pub fn get_type(&self) -> Result<CollectionType> {
        CollectionType::from_id(self.type_id)
    }
}

/// Collection joined with its extractor and membership counts
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CollectionDetails {
    pub id: i64,
    pub online_id: String,
    pub online_title: Option<String>,
    pub custom_title: Option<String>,
    pub url: Option<String>,
    pub type_id: i64,
    pub type_name: String,
    pub extractor_id: i64,
    pub extractor_name: String,
    pub update_schedule: Option<String>,
    pub created_at: String,
    pub owned_video_count: i64,
    pub member_video_count: i64,
}

/// A collection a video belongs to, with its position there
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CollectionMembership {
    pub collection_id: i64,
    pub online_id: String,
    pub online_title: Option<String>,
    pub type_id: i64,
    pub ordering_index: i64,
}

/// A catalogued video row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub online_id: String,
    pub extractor_id: i64,
    pub url: Option<String>,
    pub title: String,
    pub format_id: Option<i64>,
    pub duration_s: Option<i64>,
    pub upload_date: Option<NaiveDate>,
    pub filepath: String,
    pub filepath_exists: bool,
    pub filepath_last_checked: Option<String>,
    pub download_datetime: Option<String>,
}

/// Video joined with its extractor, owner, format and download state
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoDetails {
    pub id: i64,
    pub online_id: String,
    pub extractor_id: i64,
    pub url: Option<String>,
    pub title: String,
    pub format_id: Option<i64>,
    pub duration_s: Option<i64>,
    pub upload_date: Option<NaiveDate>,
    pub filepath: String,
    pub filepath_exists: bool,
    pub filepath_last_checked: Option<String>,
    pub download_datetime: Option<String>,
    pub extractor_name: String,
    pub owner_collection_id: Option<i64>,
    pub owner_title: Option<String>,
    pub format_label: Option<String>,
    pub format_value: Option<String>,
    pub queued: bool,
    pub not_before: Option<String>,
    pub in_progress: bool,
    pub failed: bool,
    pub error_text: Option<String>,
    pub last_fail_datetime: Option<String>,
}

impl VideoDetails {
    /// Current position in the download lifecycle
    pub fn download_state(&self) -> DownloadState {
        if self.in_progress {
            DownloadState::InProgress
        } else if self.queued {
            DownloadState::Queued
        } else if self.failed {
            DownloadState::Failed
        } else if self.filepath_exists {
            DownloadState::Succeeded
        } else {
            DownloadState::None
        }
    }
}

/// Download lifecycle of a single video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    None,
    Queued,
    InProgress,
    Succeeded,
    Failed,
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadState::None => write!(f, "none"),
            DownloadState::Queued => write!(f, "queued"),
            DownloadState::InProgress => write!(f, "in progress"),
            DownloadState::Succeeded => write!(f, "succeeded"),
            DownloadState::Failed => write!(f, "failed"),
        }
    }
}

/// How a download attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Succeeded,
    Failed(String),
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Succeeded)
    }
}

/// Selectable output format
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FormatOption {
    pub id: i64,
    pub category: String,
    pub label: String,
    pub value: String,
}

/// Videos passed to a cross-reference upsert
#[derive(Debug, Clone, Copy)]
pub enum VideoRefs<'a> {
    One(i64),
    Many(&'a [i64]),
}

/// Ordering indices passed to a cross-reference upsert
#[derive(Debug, Clone, Copy)]
pub enum OrderingIndices<'a> {
    /// Every row gets [`ORDERING_SENTINEL`]
    Sentinel,
    /// Every row gets the same index
    One(i64),
    /// One index per video, position for position
    Many(&'a [i64]),
}

/// Expand cross-reference arguments into `(video_id, ordering_index)` pairs.
///
/// Fails before anything is written when the shapes do not line up.
pub fn pair_xrefs(videos: VideoRefs<'_>, indices: OrderingIndices<'_>) -> Result<Vec<(i64, i64)>> {
    match (videos, indices) {
        (VideoRefs::One(video_id), OrderingIndices::Sentinel) => {
            Ok(vec![(video_id, ORDERING_SENTINEL)])
        }
        (VideoRefs::One(video_id), OrderingIndices::One(index)) => Ok(vec![(video_id, index)]),
        (VideoRefs::One(_), OrderingIndices::Many(_)) => Err(Error::InvalidArguments(
            "ordering indices cannot be a list when the video id is scalar".to_string(),
        )),
        (VideoRefs::Many(ids), OrderingIndices::Sentinel) => {
            Ok(ids.iter().map(|id| (*id, ORDERING_SENTINEL)).collect())
        }
        (VideoRefs::Many(ids), OrderingIndices::One(index)) => {
            Ok(ids.iter().map(|id| (*id, index)).collect())
        }
        (VideoRefs::Many(ids), OrderingIndices::Many(positions)) => {
            if ids.len() != positions.len() {
                return Err(Error::LengthMismatch {
                    videos: ids.len(),
                    indices: positions.len(),
                });
            }
            Ok(ids.iter().copied().zip(positions.iter().copied()).collect())
        }
    }
}

/// Row counts across the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogStats {
    pub extractor_count: usize,
    pub collection_count: usize,
    pub video_count: usize,
    pub queued_count: usize,
    pub in_progress_count: usize,
    pub failed_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_type_parsing() {
        assert_eq!("channel".parse::<CollectionType>().unwrap(), CollectionType::Channel);
        assert_eq!("Playlist".parse::<CollectionType>().unwrap(), CollectionType::Playlist);
        assert!(matches!(
            "album".parse::<CollectionType>(),
            Err(Error::InvalidCollectionType(_))
        ));
        assert!(matches!(
            CollectionType::from_id(9),
            Err(Error::InvalidCollectionType(_))
        ));
        assert_eq!(CollectionType::from_id(2).unwrap(), CollectionType::Playlist);
    }

    #[test]
    fn test_pair_xrefs_shapes() {
        assert_eq!(
            pair_xrefs(VideoRefs::One(4), OrderingIndices::Sentinel).unwrap(),
            vec![(4, ORDERING_SENTINEL)]
        );
        assert_eq!(
            pair_xrefs(VideoRefs::Many(&[1, 2]), OrderingIndices::One(7)).unwrap(),
            vec![(1, 7), (2, 7)]
        );
        assert_eq!(
            pair_xrefs(VideoRefs::Many(&[1, 2, 3]), OrderingIndices::Many(&[3, 1, 2])).unwrap(),
            vec![(1, 3), (2, 1), (3, 2)]
        );
    }

    #[test]
    fn test_pair_xrefs_rejects_bad_shapes() {
        assert!(matches!(
            pair_xrefs(VideoRefs::Many(&[1, 2, 3]), OrderingIndices::Many(&[1, 2])),
            Err(Error::LengthMismatch {
                videos: 3,
                indices: 2
            })
        ));
        assert!(matches!(
            pair_xrefs(VideoRefs::One(1), OrderingIndices::Many(&[1])),
            Err(Error::InvalidArguments(_))
        ));
    }
}
