//! `nsdb run` – drive the orchestrator to completion.

use anyhow::Result;
use nsdb_core::acquisition::AcquisitionController;
use nsdb_core::config::NsdbConfig;
use nsdb_core::job_store::JobStore;
use nsdb_core::orchestrator::{Instance, Orchestrator};
use nsdb_core::pool::{CommandParser, PoolSizing};
use std::sync::Arc;
use std::time::Instant;

pub async fn run_pipeline(cfg: &NsdbConfig, db: &JobStore, instance: Instance) -> Result<()> {
    let started = Instant::now();
    let sizing = PoolSizing::detect(
        cfg.free_cores,
        instance.count,
        cfg.split.partitions_per_parse_worker,
    );
    println!(
        "instance {}/{}: {} parse worker(s), {} split worker(s), {} partitions per dump",
        instance.id,
        instance.count,
        sizing.parse_workers,
        sizing.split_workers,
        sizing.partitions_per_dump
    );

    let parser = Arc::new(CommandParser {
        command: cfg.parser_command.clone(),
        instance: instance.label(),
    });
    let orchestrator = Orchestrator::start(
        cfg.clone(),
        instance,
        db.clone(),
        AcquisitionController::with_defaults(cfg),
        parser,
        sizing,
    )
    .await?;
    let summary = orchestrator.run().await?;

    println!(
        "{} dump(s) acquired, {} partition(s) parsed, {} task failure(s) in {:.1}s",
        summary.dumps_acquired,
        summary.partitions_parsed,
        summary.tasks.failed,
        started.elapsed().as_secs_f64()
    );
    if summary.tasks.failed > 0 {
        println!("see {} for details", cfg.error_dir().display());
    }
    println!("=== EXIT ===");
    Ok(())
}
