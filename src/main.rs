//! tubecatalog CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tubecatalog::{
    catalog::open_and_recover,
    commands::{
        cmd_add, cmd_clear_in_progress, cmd_clear_queue, cmd_collection, cmd_failed,
        cmd_formats, cmd_history, cmd_init, cmd_queue, cmd_retry, cmd_run_queue, cmd_status,
        cmd_video, print_add_results, print_collection, print_download_list, print_formats,
        print_init, print_queue_run, print_retry, print_settings, print_status, print_video,
        AddOptions, InitOptions, RetryOptions, VideoLookup,
    },
    config::Config,
    error::{Error, Result},
    progress::LogWriterFactory,
};

#[derive(Parser)]
#[command(name = "tubecatalog")]
#[command(version, about = "SQLite catalog and download tracker for yt-dlp", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize tubecatalog configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Catalog and download one or more URLs
    Add {
        /// Video, playlist or channel URLs
        #[arg(required = true)]
        urls: Vec<String>,

        /// Format id (see 'tubecatalog formats')
        #[arg(short, long)]
        format: Option<i64>,

        /// Number of concurrent workers
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// List queued downloads
    Queue {
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// List failed downloads
    Failed,

    /// List recent downloads
    History {
        /// Maximum number of rows
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Queue videos for another download attempt
    Retry {
        /// Video IDs to queue
        #[arg(required_unless_present = "all_failed")]
        video_ids: Vec<i64>,

        /// Queue every failed download
        #[arg(long)]
        all_failed: bool,

        /// Delay before the retry becomes due
        #[arg(long, default_value = "0")]
        delay_secs: u64,
    },

    /// Download everything due on the queue
    RunQueue {
        /// Maximum number of downloads
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Show a video by ID or by extractor and online ID
    Video {
        /// Catalog video ID
        #[arg(required_unless_present_all = ["extractor", "online_id"])]
        id: Option<i64>,

        /// Extractor name (e.g. Youtube)
        #[arg(long, requires = "online_id", conflicts_with = "id")]
        extractor: Option<String>,

        /// ID assigned by the site
        #[arg(long, requires = "extractor", conflicts_with = "id")]
        online_id: Option<String>,
    },

    /// Show a channel or playlist and its videos
    Collection {
        /// Catalog collection ID
        id: i64,
    },

    /// List selectable formats
    Formats,

    /// Show effective settings after environment overrides
    Settings,

    /// Show system status
    Status,

    /// Remove every queued download
    ClearQueue,

    /// Remove every in-progress marker
    ClearInProgress,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "tubecatalog", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let settings = config.settings()?;
    let show_progress = !cli.json;

    if let Commands::Settings = cli.command {
        return emit(cli.json, &settings, print_settings);
    }

    let db = open_and_recover(&settings.db_file).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } | Commands::Settings => {
            unreachable!()
        }

        Commands::Add { urls, format, jobs } => {
            let options = AddOptions {
                urls,
                format_id: format,
                jobs,
                show_progress,
            };
            let results = cmd_add(&settings, options).await?;
            emit(cli.json, &results, |r| print_add_results(r))?;
        }

        Commands::Queue { limit } => {
            let videos = cmd_queue(&db, limit.unwrap_or(settings.queue_limit)).await?;
            emit(cli.json, &videos, |v| {
                print_download_list("⏳ Download Queue", v, "The queue is empty.")
            })?;
        }

        Commands::Failed => {
            let videos = cmd_failed(&db).await?;
            emit(cli.json, &videos, |v| {
                print_download_list("⚠ Failed Downloads", v, "No failed downloads.")
            })?;
        }

        Commands::History { limit } => {
            let videos = cmd_history(&db, limit.unwrap_or(settings.recent_limit)).await?;
            emit(cli.json, &videos, |v| {
                print_download_list("🕘 Recent Downloads", v, "Nothing downloaded yet.")
            })?;
        }

        Commands::Retry {
            video_ids,
            all_failed,
            delay_secs,
        } => {
            let options = RetryOptions {
                video_ids,
                all_failed,
                delay_secs,
            };
            let report = cmd_retry(&db, options).await?;
            emit(cli.json, &report, print_retry)?;
        }

        Commands::RunQueue { limit } => {
            let limit = limit.unwrap_or(settings.queue_limit);
            let results = cmd_run_queue(&settings, &db, limit, show_progress).await?;
            emit(cli.json, &results, |r| print_queue_run(r))?;
        }

        Commands::Video {
            id,
            extractor,
            online_id,
        } => {
            let lookup = match (id, extractor, online_id) {
                (Some(id), _, _) => VideoLookup::Id(id),
                (None, Some(extractor), Some(online_id)) => VideoLookup::Natural {
                    extractor,
                    online_id,
                },
                _ => {
                    return Err(Error::InvalidArguments(
                        "give a video ID or both --extractor and --online-id".to_string(),
                    ))
                }
            };
            let report = cmd_video(&db, lookup).await?;
            emit(cli.json, &report, print_video)?;
        }

        Commands::Collection { id } => {
            let report = cmd_collection(&db, id).await?;
            emit(cli.json, &report, print_collection)?;
        }

        Commands::Formats => {
            let formats = cmd_formats(&db).await?;
            emit(cli.json, &formats, print_formats)?;
        }

        Commands::Status => {
            let status = cmd_status(&config, &settings, &db).await?;
            emit(cli.json, &status, print_status)?;
        }

        Commands::ClearQueue => {
            let report = cmd_clear_queue(&db).await?;
            emit(cli.json, &report, |r| {
                println!("✓ Removed {} queued download(s)", r.cleared)
            })?;
        }

        Commands::ClearInProgress => {
            let report = cmd_clear_in_progress(&db).await?;
            emit(cli.json, &report, |r| {
                println!("✓ Removed {} in-progress marker(s)", r.cleared)
            })?;
        }
    }

    db.close().await;
    Ok(())
}

/// Print `value` as JSON or through its console printer
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // A .toml path names the config file; anything else is a directory
    let (base_dir, config_path) = if let Some(path) = cli.config {
        if path.extension().is_some_and(|e| e == "toml") {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        } else {
            (path.clone(), path.join("config.toml"))
        }
    } else {
        let base = Config::default_base_dir();
        (base.clone(), base.join("config.toml"))
    };

    let report = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })
    .await?;

    emit(cli.json, &report, print_init)
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
