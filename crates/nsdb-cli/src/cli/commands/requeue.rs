//! `nsdb requeue` – move failed partitions back to todo.

use anyhow::Result;
use nsdb_core::job_store::JobStore;

pub async fn run_requeue(db: &JobStore) -> Result<()> {
    let n = db.requeue_failed().await?;
    if n == 0 {
        println!("No failed partitions.");
    } else {
        println!("Requeued {} partition(s).", n);
    }
    Ok(())
}
