//! Init command implementation

use crate::catalog::CatalogDb;
use crate::config::{Config, PathsConfig};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Where init put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub config_path: String,
    pub db_path: String,
    pub download_dir: String,
}

/// Write a default config and create the catalog database
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.paths = PathsConfig {
        db_file: base_dir.join("catalog.db"),
        config_file: config_path,
        base_dir,
    };
    config.save()?;

    let download_dir = config.download_dir();
    std::fs::create_dir_all(&download_dir)?;

    let db = CatalogDb::open(&config.paths.db_file, 1).await?;
    db.close().await;
    info!("Catalog ready at {:?}", config.paths.db_file);

    Ok(InitReport {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        download_dir: download_dir.display().to_string(),
    })
}

/// Print init summary to console
pub fn print_init(report: &InitReport) {
    println!("\n✓ tubecatalog initialized\n");
    println!("Config:    {}", report.config_path);
    println!("Database:  {}", report.db_path);
    println!("Downloads: {}", report.download_dir);
    println!("\nNext: tubecatalog add <URL>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
        }
    }

    #[tokio::test]
    async fn test_init_creates_config_and_db() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(tmp.path().join("config.toml").exists());
        assert!(tmp.path().join("catalog.db").exists());
        assert!(tmp.path().join("downloads").is_dir());
        assert!(report.db_path.ends_with("catalog.db"));

        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert!(config.is_initialized());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        assert!(matches!(
            cmd_init(options(&tmp, false)).await,
            Err(Error::Config(_))
        ));
        assert!(cmd_init(options(&tmp, true)).await.is_ok());
    }
}
