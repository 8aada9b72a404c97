//! Status and settings command implementations

use crate::catalog::{CatalogDb, CatalogStats};
use crate::config::{Config, Settings};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub download_dir: String,
    pub extractor_program: String,
    pub db_stats: CatalogStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, settings: &Settings, db: &CatalogDb) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.catalog_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: settings.db_file.display().to_string(),
        download_dir: settings.download_dir.display().to_string(),
        extractor_program: settings.extractor_program.clone(),
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 tubecatalog Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Downloads: {}", status.download_dir);
    println!("Extractor: {}", status.extractor_program);
    println!("\nCatalog:");
    println!("  Extractors: {}", status.db_stats.extractor_count);
    println!("  Collections: {}", status.db_stats.collection_count);
    println!("  Videos: {}", status.db_stats.video_count);
    println!("\nDownloads:");
    println!("  Queued: {}", status.db_stats.queued_count);
    println!("  In progress: {}", status.db_stats.in_progress_count);
    println!("  Failed: {}", status.db_stats.failed_count);
}

/// Print the effective settings, marking environment overrides
pub fn print_settings(settings: &Settings) {
    use crate::config::{
        ENV_DB_PATH, ENV_DEFAULT_FORMAT, ENV_DOWNLOAD_DIR, ENV_EXTRACTOR_PROGRAM,
        ENV_MAX_PROCESSES, ENV_OUTPUT_TEMPLATE,
    };

    let mark = |key: &str| {
        if settings.overridden.contains(key) {
            format!("  (from {})", key)
        } else {
            String::new()
        }
    };

    println!("\n⚙ Settings\n");
    println!(
        "output_template = {}{}",
        settings.output_template,
        mark(ENV_OUTPUT_TEMPLATE)
    );
    println!(
        "download_dir    = {}{}",
        settings.download_dir.display(),
        mark(ENV_DOWNLOAD_DIR)
    );
    println!(
        "default_format  = {}{}",
        settings.default_format,
        mark(ENV_DEFAULT_FORMAT)
    );
    println!(
        "max_workers     = {}{}",
        settings.max_workers,
        mark(ENV_MAX_PROCESSES)
    );
    println!(
        "extractor       = {}{}",
        settings.extractor_program,
        mark(ENV_EXTRACTOR_PROGRAM)
    );
    if !settings.extractor_args.is_empty() {
        println!("extractor_args  = {}", settings.extractor_args.join(" "));
    }
    println!(
        "db_file         = {}{}",
        settings.db_file.display(),
        mark(ENV_DB_PATH)
    );
    println!("recent_limit    = {}", settings.recent_limit);
    println!("queue_limit     = {}", settings.queue_limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{insert_sample_video, setup_test_db};
    use crate::catalog::DownloadTracker;

    #[tokio::test]
    async fn test_status_reports_catalog_counts() {
        let (db, tmp) = setup_test_db().await;
        let id = insert_sample_video(&db, "v1").await;
        db.mark_download_queued(id, None).await.unwrap();

        let mut config = Config::default();
        config.paths.base_dir = tmp.path().to_path_buf();
        config.paths.config_file = tmp.path().join("config.toml");
        config.paths.db_file = tmp.path().join("test.db");
        let settings = config.settings_with(|_| None).unwrap();

        let status = cmd_status(&config, &settings, &db).await.unwrap();
        assert_eq!(status.db_stats.video_count, 1);
        assert_eq!(status.db_stats.collection_count, 1);
        assert_eq!(status.db_stats.queued_count, 1);
        assert!(status.db_path.ends_with("test.db"));
    }
}
