//! Split worker pool.
//!
//! Extracted dumps are handed over on a bounded queue; each worker streams
//! one dump through the partitioner and registers every emitted partition as
//! a `todo` row while the split is still running, so parse workers can start
//! on early partitions.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::job_store::JobStore;
use crate::partitioner::Partitioner;

use super::report::{TaskKind, TaskReport};

pub struct SplitPool {
    tx: mpsc::Sender<PathBuf>,
    /// Dumps submitted and not yet finished (queued or splitting).
    pending: Arc<AtomicUsize>,
    workers: usize,
    handles: Vec<JoinHandle<()>>,
}

impl SplitPool {
    /// Start `workers` split workers. `partitioner` is the template each
    /// split uses; the queue holds at most `workers` waiting dumps.
    pub fn start(
        workers: usize,
        partitioner: Partitioner,
        store: JobStore,
        reports: mpsc::Sender<TaskReport>,
    ) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<PathBuf>(workers);
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));

        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let pending = Arc::clone(&pending);
                let partitioner = partitioner.clone();
                let store = store.clone();
                let reports = reports.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(dump) = next else {
                            break;
                        };
                        let subject = dump
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| dump.display().to_string());
                        tracing::info!(worker, dump = %subject, "split started");
                        let outcome = split_one(&partitioner, &store, dump).await.map(|n| {
                            tracing::info!(worker, dump = %subject, partitions = n, "split finished");
                        });
                        pending.fetch_sub(1, Ordering::AcqRel);
                        let _ = reports
                            .send(TaskReport::new(TaskKind::Split, subject, outcome))
                            .await;
                    }
                })
            })
            .collect();

        Self {
            tx,
            pending,
            workers,
            handles,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Queue an extracted dump. Waits while the queue is full.
    pub async fn submit(&self, dump: PathBuf) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(dump).await.is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            anyhow::bail!("split pool is shut down");
        }
        Ok(())
    }

    /// Close the queue and wait for queued and running splits to finish.
    pub async fn drain(self) {
        drop(self.tx);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("split worker join: {}", e);
            }
        }
    }
}

/// Split one dump and register its partitions. Returns the partition count.
pub async fn split_one(partitioner: &Partitioner, store: &JobStore, dump: PathBuf) -> Result<usize> {
    let (name_tx, mut name_rx) = mpsc::channel::<String>(16);
    let task = tokio::task::spawn_blocking({
        let partitioner = partitioner.clone();
        let dump = dump.clone();
        move || {
            partitioner.split_file(&dump, |name| {
                name_tx
                    .blocking_send(name.to_string())
                    .map_err(|_| anyhow::anyhow!("partition registration stopped"))
            })
        }
    });

    let mut insert_err = None;
    while let Some(name) = name_rx.recv().await {
        if let Err(e) = store.insert_todo(&name).await {
            insert_err = Some(e.context(format!("register partition {}", name)));
            break;
        }
    }
    // Stops the splitter at its next emit if registration failed.
    drop(name_rx);

    let split = task.await.context("split task join")?;
    if let Some(e) = insert_err {
        return Err(e);
    }
    let summary = split.with_context(|| format!("split {}", dump.display()))?;
    Ok(summary.partitions.len())
}
