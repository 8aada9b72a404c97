//! Default values for configuration

/// Default output template, relative to the download directory
pub fn default_output_template() -> String {
    "%(uploader)s/%(title)s [%(id)s].%(ext)s".to_string()
}

/// Default format id (the seeded "Best" entry)
pub fn default_format_id() -> i64 {
    1
}

/// Default number of ingestion workers
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

/// Default metadata extractor / downloader program
pub fn default_extractor_program() -> String {
    std::env::var("TUBECATALOG_YTDLP").unwrap_or_else(|_| "yt-dlp".to_string())
}

/// Default number of rows shown in the download history
pub fn default_recent_limit() -> i64 {
    15
}

/// Default number of rows shown in the download queue
pub fn default_queue_limit() -> i64 {
    15
}
