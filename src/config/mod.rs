//! Configuration management for tubecatalog
//!
//! Handles loading, saving, and validating configuration from TOML files,
//! and resolves the effective settings by layering environment overrides
//! on top of the file.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the output template
pub const ENV_OUTPUT_TEMPLATE: &str = "YDL_OUTPUT_TEMPLATE";
/// Environment variable overriding the download directory
pub const ENV_DOWNLOAD_DIR: &str = "YDL_DOWNLOAD_DIR";
/// Environment variable overriding the default format id
pub const ENV_DEFAULT_FORMAT: &str = "YDL_DEFAULT_FORMAT";
/// Environment variable overriding the worker count
pub const ENV_MAX_PROCESSES: &str = "YDL_MAX_PROCESSES";
/// Environment variable overriding the extractor program
pub const ENV_EXTRACTOR_PROGRAM: &str = "YDL_EXTRACTOR_PROGRAM";
/// Environment variable overriding the catalog database path
pub const ENV_DB_PATH: &str = "YDL_DB_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download destination and format configuration
    #[serde(default)]
    pub download: DownloadConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// External extractor program configuration
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Listing limits
    #[serde(default)]
    pub history: HistoryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output template, interpolated with the metadata of each video
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// Directory downloads are written into (defaults to `<base>/downloads`)
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// Format id used when a request does not name one
    #[serde(default = "default_format_id")]
    pub default_format: i64,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent ingestion workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

/// Extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Program used for metadata extraction and downloads
    #[serde(default = "default_extractor_program")]
    pub program: String,

    /// Extra arguments passed to every invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Listing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: i64,

    #[serde(default = "default_queue_limit")]
    pub queue_limit: i64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for tubecatalog data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_template: default_output_template(),
            download_dir: None,
            default_format: default_format_id(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: default_extractor_program(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            queue_limit: default_queue_limit(),
        }
    }
}

/// Effective settings after environment overrides have been applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub output_template: String,
    pub download_dir: PathBuf,
    pub default_format: i64,
    pub max_workers: usize,
    pub extractor_program: String,
    pub extractor_args: Vec<String>,
    pub db_file: PathBuf,
    pub recent_limit: i64,
    pub queue_limit: i64,
    /// Names of the environment variables that replaced a file value
    pub overridden: BTreeSet<String>,
}

impl Config {
    /// Get the default base directory for tubecatalog (~/.tubecatalog)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tubecatalog")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("catalog.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("catalog.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to
    /// defaults when no config file exists there yet
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if tubecatalog is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Directory downloads land in when neither file nor environment names one
    pub fn download_dir(&self) -> PathBuf {
        self.download
            .download_dir
            .clone()
            .unwrap_or_else(|| self.paths.base_dir.join("downloads"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_template(&self.download.output_template)?;

        if self.workers.max_workers == 0 {
            return Err(Error::Config(
                "workers.max_workers must be at least 1".to_string(),
            ));
        }

        if self.extractor.program.trim().is_empty() {
            return Err(Error::Config(
                "extractor.program must not be empty".to_string(),
            ));
        }

        if self.history.recent_limit <= 0 || self.history.queue_limit <= 0 {
            return Err(Error::Config(
                "history limits must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the effective settings using the process environment
    pub fn settings(&self) -> Result<Settings> {
        self.settings_with(env_var_nonempty)
    }

    /// Resolve the effective settings with an explicit environment lookup
    pub fn settings_with(&self, env_lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let mut overridden = BTreeSet::new();
        let mut lookup = |key: &str| {
            let value = env_lookup(key);
            if let Some(value) = &value {
                debug!("{} overridden by environment with value: {}", key, value);
                overridden.insert(key.to_string());
            }
            value
        };

        let output_template =
            lookup(ENV_OUTPUT_TEMPLATE).unwrap_or_else(|| self.download.output_template.clone());
        let download_dir = lookup(ENV_DOWNLOAD_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.download_dir());
        let default_format = parse_override(
            ENV_DEFAULT_FORMAT,
            lookup(ENV_DEFAULT_FORMAT),
            self.download.default_format,
        );
        let max_workers = parse_override(
            ENV_MAX_PROCESSES,
            lookup(ENV_MAX_PROCESSES),
            self.workers.max_workers,
        );
        let extractor_program =
            lookup(ENV_EXTRACTOR_PROGRAM).unwrap_or_else(|| self.extractor.program.clone());
        let db_file = lookup(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.paths.db_file.clone());

        validate_template(&output_template)?;
        if max_workers == 0 {
            return Err(Error::Config(format!("{} must be at least 1", ENV_MAX_PROCESSES)));
        }

        Ok(Settings {
            output_template,
            download_dir,
            default_format,
            max_workers,
            extractor_program,
            extractor_args: self.extractor.extra_args.clone(),
            db_file,
            recent_limit: self.history.recent_limit,
            queue_limit: self.history.queue_limit,
            overridden,
        })
    }
}

fn validate_template(template: &str) -> Result<()> {
    if template.trim().is_empty() {
        return Err(Error::Config(
            "download.output_template must not be empty".to_string(),
        ));
    }
    if Path::new(template).is_absolute() {
        return Err(Error::Config(
            "download.output_template must be relative to the download directory".to_string(),
        ));
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, fallback: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {}: {:?}", key, value);
            fallback
        }),
        None => fallback,
    }
}

fn env_var_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
