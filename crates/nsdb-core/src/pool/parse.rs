//! Parse worker pool.
//!
//! Parse workers are long-lived and independent of any one dump: each claims
//! the oldest `todo` partition from the job store, hands it to the record
//! parser, and records the result. A worker with nothing to claim sleeps and
//! polls again. Draining lets workers exit once nothing is claimable;
//! halting lets each finish its current partition and claim nothing more.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::job_store::JobStore;

use super::report::{TaskKind, TaskReport};

/// Consumes one partition file, restricted to the given namespaces.
pub trait RecordParser: Send + Sync {
    fn parse(&self, partition: &Path, namespaces: &[i32]) -> Result<()>;
}

/// Runs an external parser program:
/// `<program> [args..] <partition> --namespaces <n,..> --instance <id>`.
#[derive(Debug, Clone)]
pub struct CommandParser {
    pub command: Vec<String>,
    pub instance: String,
}

impl RecordParser for CommandParser {
    fn parse(&self, partition: &Path, namespaces: &[i32]) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("parser command is empty"))?;
        let ns = namespaces
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let output = Command::new(program)
            .args(args)
            .arg(partition)
            .arg("--namespaces")
            .arg(ns)
            .arg("--instance")
            .arg(&self.instance)
            .output()
            .with_context(|| format!("failed to run parser {}", program))?;
        if !output.status.success() {
            anyhow::bail!(
                "parser {} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Everything a parse worker needs.
#[derive(Clone)]
pub struct ParseContext {
    pub store: JobStore,
    pub parser: Arc<dyn RecordParser>,
    pub partitions_dir: PathBuf,
    pub namespaces: Vec<i32>,
    pub instance: String,
    pub idle_poll: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Run,
    /// Exit once idle.
    Drain,
    /// Exit after the current partition.
    Halt,
}

pub struct ParsePool {
    stop: watch::Sender<Stop>,
    handles: Vec<JoinHandle<u64>>,
}

impl ParsePool {
    pub fn start(workers: usize, ctx: ParseContext, reports: mpsc::Sender<TaskReport>) -> Self {
        let (stop, stop_rx) = watch::channel(Stop::Run);
        let handles = (0..workers.max(1))
            .map(|worker| {
                let ctx = ctx.clone();
                let reports = reports.clone();
                let stop_rx = stop_rx.clone();
                tokio::spawn(run_worker(worker, ctx, reports, stop_rx))
            })
            .collect();
        Self { stop, handles }
    }

    /// Ask workers to exit once idle and wait for them. Returns partitions processed.
    pub async fn drain(self) -> u64 {
        self.stop_with(Stop::Drain).await
    }

    /// Let in-flight parses finish and record their results, leaving the
    /// rest of the queue untouched. Returns partitions processed.
    pub async fn halt(self) -> u64 {
        self.stop_with(Stop::Halt).await
    }

    async fn stop_with(self, mode: Stop) -> u64 {
        let _ = self.stop.send(mode);
        let mut processed = 0;
        for handle in self.handles {
            match handle.await {
                Ok(n) => processed += n,
                Err(e) => tracing::warn!("parse worker join: {}", e),
            }
        }
        processed
    }
}

async fn run_worker(
    worker: usize,
    ctx: ParseContext,
    reports: mpsc::Sender<TaskReport>,
    mut stop: watch::Receiver<Stop>,
) -> u64 {
    let mut processed = 0u64;
    loop {
        if *stop.borrow() == Stop::Halt {
            break;
        }
        match ctx.store.claim_next(&ctx.instance).await {
            Ok(Some(claim)) => {
                tracing::debug!(worker, partition = %claim.file_name, "parse started");
                let outcome = parse_one(&ctx, &claim.file_name).await;
                let error = outcome.as_ref().err().map(|e| format!("{:#}", e));
                match ctx
                    .store
                    .complete(&claim, outcome.is_ok(), error.as_deref())
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(
                        partition = %claim.file_name,
                        "parse result dropped, partition was reclaimed"
                    ),
                    Err(e) => tracing::warn!(
                        partition = %claim.file_name,
                        "could not record parse result: {:#}",
                        e
                    ),
                }
                let _ = reports
                    .send(TaskReport::new(TaskKind::Parse, claim.file_name, outcome))
                    .await;
                processed += 1;
                continue;
            }
            Ok(None) => {}
            // Treated as nothing to claim; the next poll tries again.
            Err(e) => tracing::warn!(worker, "claim failed: {:#}", e),
        }

        if *stop.borrow() != Stop::Run {
            break;
        }
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(ctx.idle_poll) => {}
        }
    }
    tracing::debug!(worker, processed, "parse worker exiting");
    processed
}

async fn parse_one(ctx: &ParseContext, name: &str) -> Result<()> {
    let path = ctx.partitions_dir.join(name);
    let parser = Arc::clone(&ctx.parser);
    let namespaces = ctx.namespaces.clone();
    tokio::task::spawn_blocking(move || parser.parse(&path, &namespaces))
        .await
        .map_err(|e| anyhow::anyhow!("parser task join: {}", e))?
        .with_context(|| format!("parse {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::job_store::{open_memory_with_clock, PartitionStatus};
    use std::sync::Mutex;

    /// Fails any partition whose name ends in `.bad`.
    #[derive(Default)]
    struct RecordingParser {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl RecordParser for RecordingParser {
        fn parse(&self, partition: &Path, namespaces: &[i32]) -> Result<()> {
            assert_eq!(namespaces, &[1]);
            self.seen.lock().unwrap().push(partition.to_path_buf());
            if partition.to_string_lossy().ends_with(".bad") {
                anyhow::bail!("malformed revision");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn workers_drain_todo_and_record_results() {
        let store = open_memory_with_clock(Arc::new(ManualClock::from_unix(0)))
            .await
            .unwrap();
        for name in ["d.0", "d.1", "d.bad"] {
            store.insert_todo(name).await.unwrap();
        }
        let parser = Arc::new(RecordingParser::default());
        let ctx = ParseContext {
            store: store.clone(),
            parser: parser.clone(),
            partitions_dir: PathBuf::from("/data/partitions"),
            namespaces: vec![1],
            instance: "0".to_string(),
            idle_poll: Duration::from_millis(20),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let pool = ParsePool::start(2, ctx, tx);

        let mut failures = 0;
        for _ in 0..3 {
            let report = rx.recv().await.unwrap();
            assert_eq!(report.kind, TaskKind::Parse);
            if report.outcome.is_err() {
                failures += 1;
                assert_eq!(report.subject, "d.bad");
            }
        }
        assert_eq!(failures, 1);
        assert_eq!(pool.drain().await, 3);

        let counts = store.status_counts().await.unwrap();
        assert_eq!((counts.todo, counts.running, counts.done, counts.failed), (0, 0, 2, 1));
        let failed = store.get("d.bad").await.unwrap().unwrap();
        assert!(failed.error.unwrap().contains("malformed revision"));
        assert!(parser
            .seen
            .lock()
            .unwrap()
            .contains(&PathBuf::from("/data/partitions/d.0")));
    }

    #[tokio::test]
    async fn idle_workers_pick_up_late_work() {
        let store = open_memory_with_clock(Arc::new(ManualClock::from_unix(0)))
            .await
            .unwrap();
        let ctx = ParseContext {
            store: store.clone(),
            parser: Arc::new(RecordingParser::default()),
            partitions_dir: PathBuf::from("/p"),
            namespaces: vec![1],
            instance: "0".to_string(),
            idle_poll: Duration::from_millis(20),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let pool = ParsePool::start(1, ctx, tx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        store.insert_todo("late.0").await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.subject, "late.0");
        assert_eq!(pool.drain().await, 1);
    }

    /// Blocks every parse until the test sends a release.
    struct HeldParser {
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl RecordParser for HeldParser {
        fn parse(&self, _partition: &Path, _namespaces: &[i32]) -> Result<()> {
            let _ = self.release.lock().unwrap().recv();
            Ok(())
        }
    }

    #[tokio::test]
    async fn halt_finishes_in_flight_work_and_leaves_the_queue() {
        let store = open_memory_with_clock(Arc::new(ManualClock::from_unix(0)))
            .await
            .unwrap();
        for name in ["h.0", "h.1"] {
            store.insert_todo(name).await.unwrap();
        }
        let (release, held) = std::sync::mpsc::channel();
        let ctx = ParseContext {
            store: store.clone(),
            parser: Arc::new(HeldParser {
                release: Mutex::new(held),
            }),
            partitions_dir: PathBuf::from("/p"),
            namespaces: vec![1],
            instance: "0".to_string(),
            idle_poll: Duration::from_millis(10),
        };
        let (tx, mut rx) = mpsc::channel(8);
        let pool = ParsePool::start(1, ctx, tx);

        while store.count_by_status(PartitionStatus::Running).await.unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let halted = tokio::spawn(pool.halt());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!halted.is_finished());

        release.send(()).unwrap();
        assert_eq!(halted.await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap().subject, "h.0");
        assert_eq!(
            store.get("h.0").await.unwrap().unwrap().status,
            PartitionStatus::Done
        );
        assert_eq!(
            store.get("h.1").await.unwrap().unwrap().status,
            PartitionStatus::Todo
        );
    }

    #[test]
    fn empty_parser_command_is_an_error() {
        let p = CommandParser {
            command: Vec::new(),
            instance: "0".to_string(),
        };
        assert!(p.parse(Path::new("x"), &[1]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_parser_reports_exit_status() {
        let ok = CommandParser {
            command: vec!["true".to_string()],
            instance: "0".to_string(),
        };
        ok.parse(Path::new("x"), &[1, 3]).unwrap();
        let bad = CommandParser {
            command: vec!["false".to_string()],
            instance: "0".to_string(),
        };
        let err = bad.parse(Path::new("x"), &[1]).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
