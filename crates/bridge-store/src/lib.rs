pub mod analytics;
pub mod row;
pub mod schema;
pub mod store;

pub use store::SqliteBufferStore;

use std::collections::HashMap;

use bridge_core::types::Priority;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Opens (creating if absent) the SQLite database at `path`, runs schema
/// setup, and returns a pool ready to back a `SqliteBufferStore`.
pub async fn open_pool(path: &str, wal_enabled: bool) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    // SQLite allows only one writer; a small pool keeps transactions
    // serialized without every caller contending on a single handle.
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    schema::init(&pool, wal_enabled).await?;
    Ok(pool)
}

pub fn parse_priority_limits(raw: &HashMap<String, u64>) -> HashMap<Priority, u64> {
    raw.iter()
        .filter_map(|(k, v)| k.parse::<Priority>().ok().map(|p| (p, *v)))
        .collect()
}
