//! Types used by the partition job store.

use serde::Serialize;

/// Lifecycle state of a partition, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStatus {
    Todo,
    Running,
    Done,
    Failed,
}

impl PartitionStatus {
    pub const ALL: [PartitionStatus; 4] = [
        PartitionStatus::Todo,
        PartitionStatus::Running,
        PartitionStatus::Done,
        PartitionStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PartitionStatus::Todo => "todo",
            PartitionStatus::Running => "running",
            PartitionStatus::Done => "done",
            PartitionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "todo" => PartitionStatus::Todo,
            "running" => PartitionStatus::Running,
            "done" => PartitionStatus::Done,
            _ => PartitionStatus::Failed,
        }
    }
}

/// One partition row.
#[derive(Debug, Clone)]
pub struct PartitionRow {
    pub file_name: String,
    pub status: PartitionStatus,
    /// Unix seconds at which a worker claimed the partition.
    pub start_time: Option<i64>,
    pub error: Option<String>,
    /// Instance id of the worker that claimed it.
    pub claimed_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A worker's hold on one partition. `start_time` identifies this particular
/// claim, so a result reported for an older claim of the same file is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub file_name: String,
    pub start_time: i64,
}

/// Row counts per status, used by `nsdb status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub todo: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn outstanding(&self) -> i64 {
        self.todo + self.running
    }

    pub fn get(&self, status: PartitionStatus) -> i64 {
        match status {
            PartitionStatus::Todo => self.todo,
            PartitionStatus::Running => self.running,
            PartitionStatus::Done => self.done,
            PartitionStatus::Failed => self.failed,
        }
    }

    pub(crate) fn set(&mut self, status: PartitionStatus, n: i64) {
        match status {
            PartitionStatus::Todo => self.todo = n,
            PartitionStatus::Running => self.running = n,
            PartitionStatus::Done => self.done = n,
            PartitionStatus::Failed => self.failed = n,
        }
    }
}
