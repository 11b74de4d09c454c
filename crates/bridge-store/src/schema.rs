//! Durable store layout: table definitions and the four indexes the
//! lease/sweep/stats queries depend on.

use sqlx::SqlitePool;

pub const CREATE_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    source          TEXT NOT NULL,
    destination     TEXT NOT NULL,
    topic_or_node   TEXT NOT NULL,
    mapping_id      TEXT NOT NULL,
    value           TEXT NOT NULL,
    data_type       TEXT NOT NULL,
    status          TEXT NOT NULL,
    priority        INTEGER NOT NULL,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL DEFAULT 3,
    created_at      TEXT NOT NULL,
    processed_at    TEXT,
    expire_at       TEXT NOT NULL,
    error_message   TEXT,
    metadata        TEXT
)
"#;

pub const CREATE_FAILED_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS failed_messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    original_id     INTEGER NOT NULL,
    source          TEXT NOT NULL,
    destination     TEXT NOT NULL,
    topic_or_node   TEXT NOT NULL,
    value           TEXT NOT NULL,
    error_message   TEXT NOT NULL,
    failed_at       TEXT NOT NULL,
    retry_count     INTEGER NOT NULL,
    metadata        TEXT
)
"#;

pub const CREATE_STATISTICS: &str = r#"
CREATE TABLE IF NOT EXISTS statistics (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp       TEXT NOT NULL,
    metric_name     TEXT NOT NULL,
    metric_value    REAL NOT NULL,
    metadata        TEXT
)
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status)",
    "CREATE INDEX IF NOT EXISTS idx_messages_priority_created ON messages(priority DESC, created_at ASC)",
    "CREATE INDEX IF NOT EXISTS idx_messages_route ON messages(source, destination)",
    "CREATE INDEX IF NOT EXISTS idx_messages_expire_at ON messages(expire_at)",
];

/// Creates tables and indexes if absent, and sets WAL journaling with
/// relaxed-synchronous durability — the SQLite analogue of "write-ahead
/// journaling and relaxed-synchronous durability" from the store design.
pub async fn init(pool: &SqlitePool, wal_enabled: bool) -> anyhow::Result<()> {
    if wal_enabled {
        sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    }
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;

    sqlx::query(CREATE_MESSAGES).execute(pool).await?;
    sqlx::query(CREATE_FAILED_MESSAGES).execute(pool).await?;
    sqlx::query(CREATE_STATISTICS).execute(pool).await?;

    for idx in INDEXES {
        sqlx::query(idx).execute(pool).await?;
    }

    Ok(())
}
