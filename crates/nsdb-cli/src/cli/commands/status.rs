//! `nsdb status` – partition counts per status.

use anyhow::Result;
use nsdb_core::job_store::{JobStore, PartitionStatus};

pub async fn run_status(db: &JobStore, json: bool) -> Result<()> {
    let counts = db.status_counts().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("{:<10} {}", "STATUS", "PARTITIONS");
    for status in PartitionStatus::ALL {
        println!("{:<10} {}", status.as_str(), counts.get(status));
    }

    if counts.failed > 0 {
        println!();
        println!("{:<48} {}", "FAILED", "ERROR");
        for row in db.list_by_status(PartitionStatus::Failed).await? {
            let error = row.error.as_deref().unwrap_or("-");
            let first_line = error.lines().next().unwrap_or("-");
            println!("{:<48} {}", row.file_name, first_line);
        }
    }
    Ok(())
}
