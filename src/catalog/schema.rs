//! SQLite schema definition

/// SQL schema for the catalog database
pub const SCHEMA_SQL: &str = r#"
-- Extractors: the site or service a record came from
CREATE TABLE IF NOT EXISTS extractor (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    alt_name TEXT
);

CREATE TABLE IF NOT EXISTS collection_type (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

INSERT OR IGNORE INTO collection_type (id, name) VALUES
    (1, 'Channel'),
    (2, 'Playlist');

-- Collections: channels and playlists
CREATE TABLE IF NOT EXISTS collection (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    online_id TEXT NOT NULL,
    online_title TEXT,
    custom_title TEXT,
    url TEXT,
    type_id INTEGER NOT NULL REFERENCES collection_type(id),
    extractor_id INTEGER NOT NULL REFERENCES extractor(id),
    update_schedule TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(extractor_id, online_id, type_id)
);

-- Format options (static reference data)
CREATE TABLE IF NOT EXISTS format_category (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS format (
    id INTEGER PRIMARY KEY,
    category_id INTEGER NOT NULL REFERENCES format_category(id),
    label TEXT NOT NULL,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO format_category (id, name) VALUES
    (1, 'Video'),
    (2, 'Audio');

INSERT OR IGNORE INTO format (id, category_id, label, value) VALUES
    (1, 1, 'Best', 'bestvideo+bestaudio/best'),
    (2, 1, 'Best MP4', 'bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best'),
    (3, 1, '1080p', 'bestvideo[height<=1080]+bestaudio/best[height<=1080]'),
    (4, 1, '720p', 'bestvideo[height<=720]+bestaudio/best[height<=720]'),
    (5, 1, '480p', 'bestvideo[height<=480]+bestaudio/best[height<=480]'),
    (6, 2, 'Best audio', 'bestaudio/best'),
    (7, 2, 'M4A', 'bestaudio[ext=m4a]/bestaudio'),
    (8, 2, 'Opus', 'bestaudio[acodec=opus]/bestaudio');

-- Videos: one row per (extractor, online id)
CREATE TABLE IF NOT EXISTS video (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    online_id TEXT NOT NULL,
    extractor_id INTEGER NOT NULL REFERENCES extractor(id),
    url TEXT,
    title TEXT NOT NULL,
    format_id INTEGER,
    duration_s INTEGER,
    upload_date TEXT,
    filepath TEXT NOT NULL,
    filepath_exists INTEGER NOT NULL DEFAULT 0,
    filepath_last_checked TEXT,
    download_datetime TEXT,
    UNIQUE(extractor_id, online_id)
);

-- The single channel owning each video
CREATE TABLE IF NOT EXISTS video_owner_xref (
    video_id INTEGER PRIMARY KEY REFERENCES video(id),
    collection_id INTEGER NOT NULL REFERENCES collection(id)
);

-- Playlist memberships
CREATE TABLE IF NOT EXISTS video_collection_xref (
    video_id INTEGER NOT NULL REFERENCES video(id),
    collection_id INTEGER NOT NULL REFERENCES collection(id),
    ordering_index INTEGER NOT NULL DEFAULT -1,
    PRIMARY KEY (video_id, collection_id)
);

-- Transient download state
CREATE TABLE IF NOT EXISTS download_queued (
    video_id INTEGER PRIMARY KEY REFERENCES video(id),
    queued_datetime TEXT NOT NULL,
    not_before TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS download_in_progress (
    video_id INTEGER PRIMARY KEY REFERENCES video(id),
    start_datetime TEXT NOT NULL,
    owner_pid INTEGER,
    owner_started INTEGER
);

CREATE TABLE IF NOT EXISTS download_failed (
    video_id INTEGER PRIMARY KEY REFERENCES video(id),
    last_fail_datetime TEXT NOT NULL,
    error_text TEXT
);

CREATE VIEW IF NOT EXISTS video_details AS
SELECT
    v.id,
    v.online_id,
    v.extractor_id,
    v.url,
    v.title,
    v.format_id,
    v.duration_s,
    v.upload_date,
    v.filepath,
    v.filepath_exists,
    v.filepath_last_checked,
    v.download_datetime,
    e.name AS extractor_name,
    o.collection_id AS owner_collection_id,
    c.online_title AS owner_title,
    f.label AS format_label,
    f.value AS format_value,
    q.video_id IS NOT NULL AS queued,
    q.not_before AS not_before,
    p.video_id IS NOT NULL AS in_progress,
    fl.video_id IS NOT NULL AS failed,
    fl.error_text AS error_text,
    fl.last_fail_datetime AS last_fail_datetime
FROM video AS v
    JOIN extractor AS e ON e.id = v.extractor_id
    LEFT JOIN video_owner_xref AS o ON o.video_id = v.id
    LEFT JOIN collection AS c ON c.id = o.collection_id
    LEFT JOIN format AS f ON f.id = v.format_id
    LEFT JOIN download_queued AS q ON q.video_id = v.id
    LEFT JOIN download_in_progress AS p ON p.video_id = v.id
    LEFT JOIN download_failed AS fl ON fl.video_id = v.id;

CREATE VIEW IF NOT EXISTS collection_details AS
SELECT
    c.id,
    c.online_id,
    c.online_title,
    c.custom_title,
    c.url,
    c.type_id,
    t.name AS type_name,
    c.extractor_id,
    e.name AS extractor_name,
    c.update_schedule,
    c.created_at,
    (SELECT COUNT(*) FROM video_owner_xref AS ox WHERE ox.collection_id = c.id) AS owned_video_count,
    (SELECT COUNT(*) FROM video_collection_xref AS cx WHERE cx.collection_id = c.id) AS member_video_count
FROM collection AS c
    JOIN collection_type AS t ON t.id = c.type_id
    JOIN extractor AS e ON e.id = c.extractor_id;

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_video_download_datetime ON video(download_datetime);
CREATE INDEX IF NOT EXISTS idx_owner_collection ON video_owner_xref(collection_id);
CREATE INDEX IF NOT EXISTS idx_membership_collection ON video_collection_xref(collection_id);
CREATE INDEX IF NOT EXISTS idx_queued_not_before ON download_queued(not_before);
"#;
