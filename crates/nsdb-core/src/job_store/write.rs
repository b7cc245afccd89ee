//! Partition write operations: insert, claim, complete, sweep, cleanup.

use anyhow::Result;
use sqlx::Row;
use std::io;
use std::time::Duration;

use super::db::JobStore;
use super::types::{Claim, PartitionStatus};

impl JobStore {
    /// Register a freshly emitted partition as `todo`.
    ///
    /// Re-registering an existing name (a dump split a second time) resets it
    /// to `todo` unless a worker is currently parsing it.
    pub async fn insert_todo(&self, file_name: &str) -> Result<()> {
        let now = self.now();
        sqlx::query(
            r#"
            INSERT INTO partition (
                file_name, status, start_time, error, claimed_by, created_at, updated_at
            ) VALUES (?1, 'todo', NULL, NULL, NULL, ?2, ?2)
            ON CONFLICT(file_name) DO UPDATE
            SET status = 'todo',
                start_time = NULL,
                error = NULL,
                claimed_by = NULL,
                updated_at = excluded.updated_at
            WHERE partition.status != 'running'
            "#,
        )
        .bind(file_name)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Claim a specific partition: `todo` → `running`, stamping `start_time`.
    ///
    /// The update is conditional on the row still being `todo`, so of two
    /// racing workers exactly one gets the claim.
    pub async fn claim(&self, file_name: &str, instance: &str) -> Result<Option<Claim>> {
        let now = self.now();
        let r = sqlx::query(
            r#"
            UPDATE partition
            SET status = 'running',
                start_time = ?1,
                error = NULL,
                claimed_by = ?2,
                updated_at = ?1
            WHERE file_name = ?3
              AND status = 'todo'
            "#,
        )
        .bind(now)
        .bind(instance)
        .bind(file_name)
        .execute(&self.pool)
        .await?;
        Ok((r.rows_affected() == 1).then(|| Claim {
            file_name: file_name.to_string(),
            start_time: now,
        }))
    }

    /// Claim the oldest `todo` partition. Returns None when nothing is claimable.
    pub async fn claim_next(&self, instance: &str) -> Result<Option<Claim>> {
        loop {
            let row = sqlx::query(
                r#"
                SELECT file_name FROM partition
                WHERE status = 'todo'
                ORDER BY created_at ASC, file_name ASC
                LIMIT 1
                "#,
            )
            .fetch_optional(&self.pool)
            .await?;
            let Some(row) = row else {
                return Ok(None);
            };
            let file_name: String = row.get("file_name");
            if let Some(claim) = self.claim(&file_name, instance).await? {
                return Ok(Some(claim));
            }
            // Another worker won the race for this row; look again.
        }
    }

    /// Record the parse result for `claim`: running → done or failed.
    ///
    /// A row the timeout sweep moved to failed under this same claim still
    /// takes the late result, since the work was in fact finished. Nothing
    /// changes once the row has been requeued or claimed again, and the
    /// call returns false.
    pub async fn complete(&self, claim: &Claim, ok: bool, error: Option<&str>) -> Result<bool> {
        let now = self.now();
        let status = if ok {
            PartitionStatus::Done
        } else {
            PartitionStatus::Failed
        };
        let error = if ok { None } else { error };
        let r = sqlx::query(
            r#"
            UPDATE partition
            SET status = ?1,
                error = ?2,
                updated_at = ?3
            WHERE file_name = ?4
              AND start_time = ?5
              AND status IN ('running', 'failed')
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(&claim.file_name)
        .bind(claim.start_time)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Fail every `running` partition whose claim is strictly older than
    /// `older_than`. Returns the number of rows changed; a second sweep right
    /// after the first changes nothing.
    pub async fn mark_stale(&self, older_than: Duration, reason: &str) -> Result<u64> {
        let now = self.now();
        let cutoff = now - older_than.as_secs() as i64;
        let r = sqlx::query(
            r#"
            UPDATE partition
            SET status = 'failed',
                error = ?1,
                updated_at = ?2
            WHERE status = 'running'
              AND start_time IS NOT NULL
              AND start_time < ?3
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Hand each file name in `status` to `remove`, then delete the rows
    /// whose file is gone. Returns the names whose rows were deleted.
    ///
    /// Files go first so a crash in between leaves rows pointing at missing
    /// files, which the next call clears; a file already missing counts as
    /// removed. A row whose removal fails stays for the next call.
    pub async fn list_and_delete<F>(&self, status: PartitionStatus, mut remove: F) -> Result<Vec<String>>
    where
        F: FnMut(&str) -> io::Result<()>,
    {
        let rows = sqlx::query(
            r#"
            SELECT file_name FROM partition
            WHERE status = ?1
            ORDER BY created_at ASC, file_name ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut removed = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get("file_name");
            match remove(&name) {
                Ok(()) => removed.push(name),
                Err(e) if e.kind() == io::ErrorKind::NotFound => removed.push(name),
                Err(e) => {
                    tracing::warn!(partition = %name, error = %e, "failed to remove partition file");
                }
            }
        }

        let mut tx = self.pool.begin().await?;
        for name in &removed {
            sqlx::query(
                r#"
                DELETE FROM partition
                WHERE file_name = ?1
                  AND status = ?2
                "#,
            )
            .bind(name)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Put every `failed` partition back to `todo`. Only run on operator request.
    pub async fn requeue_failed(&self) -> Result<u64> {
        let now = self.now();
        let r = sqlx::query(
            r#"
            UPDATE partition
            SET status = 'todo',
                start_time = NULL,
                error = NULL,
                claimed_by = NULL,
                updated_at = ?1
            WHERE status = 'failed'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}
