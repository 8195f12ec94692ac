pub const SCHEMA: &str = r#"
-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'unread',
    tags TEXT NOT NULL DEFAULT '',
    added_at INTEGER NOT NULL DEFAULT 0,
    scraped_at TEXT NOT NULL DEFAULT (datetime('now')),
    content_location TEXT,
    content_length INTEGER NOT NULL DEFAULT 0,
    reading_time_estimate INTEGER NOT NULL DEFAULT 1,
    extraction_method TEXT,
    archive_url TEXT,
    success INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
CREATE INDEX IF NOT EXISTS idx_articles_success ON articles(success);

-- reading_progress table, at most one row per article
CREATE TABLE IF NOT EXISTS reading_progress (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL UNIQUE,
    reading_status TEXT NOT NULL DEFAULT 'unread',
    progress_percent INTEGER NOT NULL DEFAULT 0,
    time_started INTEGER,
    time_completed INTEGER,
    notes TEXT,
    rating INTEGER
);

-- reading_sessions table
CREATE TABLE IF NOT EXISTS reading_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL,
    session_start INTEGER NOT NULL,
    session_end INTEGER,
    duration_minutes INTEGER,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_reading_sessions_article ON reading_sessions(article_id);
"#;
