//! `nsdb split` – split one extracted dump and register its partitions.

use anyhow::{Context, Result};
use nsdb_core::config::NsdbConfig;
use nsdb_core::job_store::JobStore;
use nsdb_core::partitioner::Partitioner;
use nsdb_core::pool::{split_one, PoolSizing};
use std::path::PathBuf;

pub async fn run_split(
    cfg: &NsdbConfig,
    db: &JobStore,
    dump: PathBuf,
    partitions: Option<usize>,
    keep_dump: bool,
) -> Result<()> {
    anyhow::ensure!(dump.is_file(), "no such dump: {}", dump.display());
    let partitions = partitions.unwrap_or_else(|| {
        PoolSizing::detect(cfg.free_cores, 1, cfg.split.partitions_per_parse_worker).partitions_per_dump
    });
    let partitioner = Partitioner::new(cfg.partitions_dir(), cfg.partition_list_path(), partitions)
        .with_undershoot(cfg.split.undershoot)
        .with_delete_source(!keep_dump);

    let emitted = split_one(&partitioner, db, dump.clone())
        .await
        .with_context(|| format!("split {}", dump.display()))?;
    println!(
        "{}: {} partition(s) written to {}",
        dump.display(),
        emitted,
        cfg.partitions_dir().display()
    );
    Ok(())
}
