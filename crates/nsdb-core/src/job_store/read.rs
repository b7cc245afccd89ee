//! Partition read operations: counts and lookups.

use anyhow::Result;
use sqlx::Row;

use super::db::JobStore;
use super::types::{PartitionRow, PartitionStatus, StatusCounts};

impl JobStore {
    /// Number of partitions currently in `status`.
    pub async fn count_by_status(&self, status: PartitionStatus) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT count(*) AS n
            FROM partition
            WHERE status = ?1
            "#,
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Partitions that are either waiting or being parsed.
    pub async fn count_outstanding(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT count(*) AS n
            FROM partition
            WHERE status = 'todo' OR status = 'running'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Counts for every status in one query.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows = sqlx::query(
            r#"
            SELECT status, count(*) AS n
            FROM partition
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            counts.set(PartitionStatus::from_str(&status), n);
        }
        Ok(counts)
    }

    /// Fetch a single partition row.
    pub async fn get(&self, file_name: &str) -> Result<Option<PartitionRow>> {
        let row = sqlx::query(
            r#"
            SELECT file_name, status, start_time, error, claimed_by, created_at, updated_at
            FROM partition
            WHERE file_name = ?1
            "#,
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(row_to_partition(&row)))
    }

    /// All partitions in `status`, oldest first.
    pub async fn list_by_status(&self, status: PartitionStatus) -> Result<Vec<PartitionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT file_name, status, start_time, error, claimed_by, created_at, updated_at
            FROM partition
            WHERE status = ?1
            ORDER BY created_at ASC, file_name ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_partition).collect())
    }
}

fn row_to_partition(row: &sqlx::sqlite::SqliteRow) -> PartitionRow {
    let status: String = row.get("status");
    PartitionRow {
        file_name: row.get("file_name"),
        status: PartitionStatus::from_str(&status),
        start_time: row.get("start_time"),
        error: row.get("error"),
        claimed_by: row.get("claimed_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
