//! CLI for the NSDB dump pipeline.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nsdb_core::config::{self, NsdbConfig};
use nsdb_core::job_store::JobStore;
use nsdb_core::orchestrator::Instance;
use std::path::PathBuf;

use commands::{run_pipeline, run_requeue, run_split, run_status};

/// Top-level CLI for the NSDB dump pipeline.
#[derive(Debug, Parser)]
#[command(name = "nsdb")]
#[command(about = "NSDB: wiki dump acquisition, partitioning and parse orchestration", long_about = None)]
pub struct Cli {
    /// Data directory (overrides `data_dir` in config.toml).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the orchestrator until the manifest is exhausted and all partitions are parsed.
    Run {
        /// This instance's index among cooperating instances.
        #[arg(long, default_value = "0", value_name = "ID")]
        instance_id: usize,
        /// Total number of cooperating instances sharing the job store.
        #[arg(long, default_value = "1", value_name = "N")]
        instances: usize,
        /// Disk budget for the data directory in GB.
        #[arg(long, value_name = "GB")]
        max_space_gb: Option<u64>,
        /// Cores to leave unused when sizing worker pools.
        #[arg(long, value_name = "N")]
        free_cores: Option<usize>,
    },

    /// Split one extracted dump into partitions and register them as todo.
    Split {
        /// Path to the extracted dump file.
        dump: PathBuf,
        /// Number of partitions (default: derived from the parse pool size).
        #[arg(long, value_name = "N")]
        partitions: Option<usize>,
        /// Keep the dump file after a successful split.
        #[arg(long)]
        keep_dump: bool,
    },

    /// Show partition counts per status.
    Status {
        /// Print counts as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Move failed partitions back to todo.
    Requeue,
}

impl Cli {
    /// The pipeline instance this invocation runs as, if any.
    pub fn instance(&self) -> Option<Instance> {
        match self.command {
            CliCommand::Run {
                instance_id,
                instances,
                ..
            } => Some(Instance::new(instance_id, instances)),
            _ => None,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut cfg = config::load_or_init()?;
        if let Some(dir) = self.data_dir {
            cfg.data_dir = dir;
        }
        if let CliCommand::Run {
            max_space_gb,
            free_cores,
            ..
        } = &self.command
        {
            apply_run_overrides(&mut cfg, *max_space_gb, *free_cores);
        }
        tracing::debug!("loaded config: {:?}", cfg);
        let db = open_store(&cfg).await?;

        match self.command {
            CliCommand::Run {
                instance_id,
                instances,
                ..
            } => run_pipeline(&cfg, &db, Instance::new(instance_id, instances)).await?,
            CliCommand::Split {
                dump,
                partitions,
                keep_dump,
            } => run_split(&cfg, &db, dump, partitions, keep_dump).await?,
            CliCommand::Status { json } => run_status(&db, json).await?,
            CliCommand::Requeue => run_requeue(&db).await?,
        }

        Ok(())
    }
}

fn apply_run_overrides(cfg: &mut NsdbConfig, max_space_gb: Option<u64>, free_cores: Option<usize>) {
    if let Some(gb) = max_space_gb {
        cfg.max_space_gb = gb;
    }
    if let Some(n) = free_cores {
        cfg.free_cores = n;
    }
}

async fn open_store(cfg: &NsdbConfig) -> Result<JobStore> {
    tokio::fs::create_dir_all(&cfg.data_dir)
        .await
        .with_context(|| format!("create {}", cfg.data_dir.display()))?;
    JobStore::open_at(cfg.store_path()).await
}

#[cfg(test)]
mod tests;
