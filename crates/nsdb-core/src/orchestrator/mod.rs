//! Orchestrator loop.
//!
//! Composes acquisition, the split and parse pools and the governor into one
//! scheduling loop per instance. Each tick lands in exactly one state:
//! DONE when the manifest is exhausted and no work is outstanding, THROTTLING
//! while the governor's limits are exceeded, ACQUIRING when another dump is
//! wanted, and IDLE-POLL otherwise.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::acquisition::AcquisitionController;
use crate::config::NsdbConfig;
use crate::governor::Governor;
use crate::job_store::JobStore;
use crate::partitioner::Partitioner;
use crate::pool::{
    ErrorSink, ParseContext, ParsePool, PoolSizing, RecordParser, SinkStats, SplitPool, TaskReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Acquiring,
    Throttling,
    IdlePoll,
    Done,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Acquiring => "acquiring",
            LoopState::Throttling => "throttling",
            LoopState::IdlePoll => "idle-poll",
            LoopState::Done => "done",
        }
    }
}

/// This process's place among cooperating instances sharing one job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub id: usize,
    pub count: usize,
}

impl Default for Instance {
    fn default() -> Self {
        Self { id: 0, count: 1 }
    }
}

impl Instance {
    pub fn new(id: usize, count: usize) -> Self {
        Self {
            id,
            count: count.max(1),
        }
    }

    /// Value recorded as `claimed_by` and passed to the parser.
    pub fn label(&self) -> String {
        self.id.to_string()
    }
}

/// Totals reported when the loop reaches DONE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub dumps_acquired: u64,
    pub partitions_parsed: u64,
    pub tasks: SinkStats,
}

pub struct Orchestrator {
    cfg: NsdbConfig,
    instance: Instance,
    store: JobStore,
    acquisition: AcquisitionController,
    governor: Governor,
    split: SplitPool,
    parse: ParsePool,
    reports: mpsc::Sender<TaskReport>,
    sink: JoinHandle<SinkStats>,
    ticks: u64,
    dumps_acquired: u64,
}

impl Orchestrator {
    /// Create the data directories, make sure the manifest exists, and start
    /// the error sink and both worker pools. Parse workers begin claiming
    /// immediately.
    pub async fn start(
        cfg: NsdbConfig,
        instance: Instance,
        store: JobStore,
        acquisition: AcquisitionController,
        parser: Arc<dyn RecordParser>,
        sizing: PoolSizing,
    ) -> Result<Self> {
        for dir in [
            cfg.data_dir.clone(),
            cfg.dumps_dir(),
            cfg.archives_dir(),
            cfg.partitions_dir(),
            cfg.error_dir(),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        acquisition.ensure_manifest().await?;

        tracing::info!(
            instance = instance.id,
            instances = instance.count,
            parse_workers = sizing.parse_workers,
            split_workers = sizing.split_workers,
            partitions_per_dump = sizing.partitions_per_dump,
            "orchestrator starting"
        );

        let (reports, reports_rx) = mpsc::channel(256);
        let sink = ErrorSink::new(&cfg.error_dir()).spawn(reports_rx);

        let parse = ParsePool::start(
            sizing.parse_workers,
            ParseContext {
                store: store.clone(),
                parser,
                partitions_dir: cfg.partitions_dir(),
                namespaces: cfg.namespaces.clone(),
                instance: instance.label(),
                idle_poll: cfg.throttle.idle_poll(),
            },
            reports.clone(),
        );

        let partitioner = Partitioner::new(
            cfg.partitions_dir(),
            cfg.partition_list_path(),
            sizing.partitions_per_dump,
        )
        .with_undershoot(cfg.split.undershoot)
        .with_delete_source(true);
        let split = SplitPool::start(sizing.split_workers, partitioner, store.clone(), reports.clone());

        let governor = Governor::new(&cfg, instance.count, store.clone());
        let orchestrator = Self {
            cfg,
            instance,
            store,
            acquisition,
            governor,
            split,
            parse,
            reports,
            sink,
            ticks: 0,
            dumps_acquired: 0,
        };
        orchestrator.resume_local_dumps().await?;
        Ok(orchestrator)
    }

    /// Queue dumps left extracted by an earlier run; their manifest entries
    /// were already popped.
    async fn resume_local_dumps(&self) -> Result<()> {
        let mut leftovers: Vec<PathBuf> = std::fs::read_dir(self.acquisition.dumps_dir())
            .with_context(|| format!("read {}", self.acquisition.dumps_dir().display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        leftovers.sort();
        for dump in leftovers {
            tracing::info!(dump = %dump.display(), "resuming split of local dump");
            self.split.submit(dump).await?;
        }
        Ok(())
    }

    /// Manifest exhausted, nothing todo or running, and no split in flight.
    /// A store error reads as "not done".
    async fn is_done(&self) -> Result<bool> {
        if !self.acquisition.manifest().is_empty()? || !self.split.is_idle() {
            return Ok(false);
        }
        match self.store.count_outstanding().await {
            Ok(n) => Ok(n == 0),
            Err(e) => {
                tracing::warn!("outstanding count unavailable, not done: {:#}", e);
                Ok(false)
            }
        }
    }

    fn wants_dump(&self) -> bool {
        let dumps_limit = self.cfg.throttle.dumps_per_instance * self.instance.count;
        self.acquisition.local_dumps() < dumps_limit || self.split.pending() < self.split.workers()
    }

    /// Download, extract and queue one dump for splitting.
    async fn acquire_one(&mut self) -> Result<()> {
        let Some(archive) = self.acquisition.download_next().await? else {
            return Ok(());
        };
        let dump = self.acquisition.extract(&archive).await?;
        self.split
            .submit(self.acquisition.dumps_dir().join(&dump))
            .await?;
        self.dumps_acquired += 1;
        tracing::info!(dump = %dump, pending_splits = self.split.pending(), "dump queued for split");
        Ok(())
    }

    /// Run one scheduling step. Acquisition errors are returned; everything
    /// else is absorbed.
    pub async fn tick(&mut self) -> Result<LoopState> {
        self.ticks += 1;
        if self.is_done().await? {
            return Ok(LoopState::Done);
        }

        let snap = self.governor.snapshot().await;
        if snap.over(&self.governor.limits()) {
            self.governor.throttle().await;
            return Ok(LoopState::Throttling);
        }

        if !self.acquisition.manifest().is_empty()? && self.wants_dump() {
            self.acquire_one().await?;
            self.governor.throttle().await;
            return Ok(LoopState::Acquiring);
        }

        self.governor.sweep().await;
        Ok(LoopState::IdlePoll)
    }

    /// Tick until DONE, sleeping between ticks, then drain everything. On a
    /// tick error the pools are stopped before the error is returned: parses
    /// in flight finish and are recorded, queued partitions stay `todo`.
    pub async fn run(mut self) -> Result<RunSummary> {
        let interval = self.cfg.throttle.tick_interval();
        loop {
            let state = match self.tick().await {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!(tick = self.ticks, "run aborted: {:#}", e);
                    self.stop(Stop::Halt).await;
                    return Err(e);
                }
            };
            tracing::debug!(tick = self.ticks, state = state.as_str(), "tick");
            if state == LoopState::Done {
                break;
            }
            tokio::time::sleep(interval).await;
        }
        Ok(self.shutdown().await)
    }

    /// Close the split queue, stop idle parse workers, and flush the sink.
    pub async fn shutdown(self) -> RunSummary {
        self.stop(Stop::Drain).await
    }

    async fn stop(self, mode: Stop) -> RunSummary {
        let Self {
            split,
            parse,
            reports,
            sink,
            ticks,
            dumps_acquired,
            ..
        } = self;
        split.drain().await;
        let partitions_parsed = match mode {
            Stop::Drain => parse.drain().await,
            Stop::Halt => parse.halt().await,
        };
        drop(reports);
        let tasks = match sink.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("error sink join: {}", e);
                SinkStats::default()
            }
        };
        let summary = RunSummary {
            ticks,
            dumps_acquired,
            partitions_parsed,
            tasks,
        };
        tracing::info!(
            ticks,
            dumps = dumps_acquired,
            parsed = partitions_parsed,
            failed = tasks.failed,
            "orchestrator finished"
        );
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Drain,
    Halt,
}
