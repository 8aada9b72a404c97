//! tubecatalog - A SQLite catalog and download tracker for yt-dlp
//!
//! This crate provides:
//! - An idempotent ingestion path from extractor metadata to catalog rows
//! - A per-video download state machine with crash recovery
//! - A worker pool where every worker owns its own catalog connection
//! - CLI commands for adding URLs and managing the download queue

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod metadata;
pub mod progress;
pub mod template;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
