//! SQLite-backed job store: connection pool, migrations.
//!
//! Partition CRUD lives in `read` and `write`.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the partition job store.
///
/// Cloning is cheap; every clone shares the same connection pool and clock.
/// Connections are checked out per query and returned on every exit path.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl JobStore {
    /// Open (or create) the store at `path` using the system clock.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at_with_clock(path, Arc::new(SystemClock)).await
    }

    /// Open (or create) the store at `path`. Creates parent dirs if needed.
    pub async fn open_at_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await?;
        let store = JobStore { pool, clock };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // `start_time` is set when a worker claims the row and is what the
        // timeout sweep measures against.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS partition (
                file_name TEXT PRIMARY KEY NOT NULL,
                status TEXT NOT NULL,
                start_time INTEGER,
                error TEXT,
                claimed_by TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS partition_status_idx
            ON partition (status, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.unix_now()
    }
}

#[cfg(test)]
/// Open an in-memory store for tests (no disk I/O).
pub(crate) async fn open_memory_with_clock(clock: Arc<dyn Clock>) -> Result<JobStore> {
    // Single connection to avoid in-memory pool handing back a different empty DB.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = JobStore { pool, clock };
    store.migrate().await?;
    Ok(store)
}
