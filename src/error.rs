//! Custom error types for tubecatalog

use thiserror::Error;

/// Main error type for tubecatalog operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The storage layer accepted an insert but the row cannot be read back.
    /// This is an integrity failure and must never be retried silently.
    #[error("Integrity error: {0} not found after insertion")]
    NotFoundAfterInsert(String),

    #[error("Invalid collection type: {0}")]
    InvalidCollectionType(String),

    #[error("Length mismatch: {videos} video ids but {indices} ordering indices")]
    LengthMismatch { videos: usize, indices: usize },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unhandled metadata response type: {0}")]
    UnsupportedContainerType(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Not initialized: run 'tubecatalog init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(format!("{:#}", err))
    }
}

/// Result type alias for tubecatalog
pub type Result<T> = std::result::Result<T, Error>;
