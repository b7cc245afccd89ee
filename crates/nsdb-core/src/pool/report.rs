//! Per-task outcomes and the error-log sink that consumes them.
//!
//! Workers never log failures to files themselves: every split or parse task
//! produces a [`TaskReport`], and a single sink task appends the failures to
//! the matching error log. The pools keep running regardless.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Split,
    Parse,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Split => "split",
            TaskKind::Parse => "parse",
        }
    }
}

#[derive(Debug)]
pub struct TaskReport {
    pub kind: TaskKind,
    /// Dump or partition file the task worked on.
    pub subject: String,
    pub outcome: Result<()>,
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    pub fn new(kind: TaskKind, subject: impl Into<String>, outcome: Result<()>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            outcome,
            finished_at: Utc::now(),
        }
    }
}

/// Totals observed by the sink, returned when it shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
pub struct ErrorSink {
    split_log: PathBuf,
    parse_log: PathBuf,
}

impl ErrorSink {
    pub fn new(error_dir: &Path) -> Self {
        Self {
            split_log: error_dir.join("split_errors.log"),
            parse_log: error_dir.join("parse_errors.log"),
        }
    }

    pub fn log_path(&self, kind: TaskKind) -> &Path {
        match kind {
            TaskKind::Split => &self.split_log,
            TaskKind::Parse => &self.parse_log,
        }
    }

    /// Append the report to its error log if it is a failure.
    pub fn record(&self, report: &TaskReport) -> Result<()> {
        let Err(err) = &report.outcome else {
            return Ok(());
        };
        let path = self.log_path(report.kind);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open error log {}", path.display()))?;
        write!(
            f,
            "{}\n\n{}: {:#}\n\n{:?}\n\n",
            report.finished_at.format("%Y-%m-%d %H:%M:%S"),
            report.subject,
            err,
            err
        )?;
        Ok(())
    }

    /// Consume reports until every sender is dropped.
    pub fn spawn(self, mut rx: mpsc::Receiver<TaskReport>) -> JoinHandle<SinkStats> {
        tokio::spawn(async move {
            let mut stats = SinkStats::default();
            while let Some(report) = rx.recv().await {
                match &report.outcome {
                    Ok(()) => {
                        stats.succeeded += 1;
                        tracing::debug!(
                            kind = report.kind.as_str(),
                            subject = %report.subject,
                            "task finished"
                        );
                    }
                    Err(e) => {
                        stats.failed += 1;
                        tracing::error!(
                            kind = report.kind.as_str(),
                            subject = %report.subject,
                            "task failed: {:#}",
                            e
                        );
                    }
                }
                if let Err(e) = self.record(&report) {
                    tracing::warn!("could not write error log: {:#}", e);
                }
            }
            stats
        })
    }
}
