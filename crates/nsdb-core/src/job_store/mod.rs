//! Partition job store (SQLite via sqlx).
//!
//! Source of truth for partition lifecycle state, shared by every
//! orchestrator instance and parse worker pointed at the same database file.
//! Each operation is independently consistent at the row level; nothing here
//! spans operations in a transaction.

mod db;
mod read;
mod types;
mod write;

pub use db::JobStore;
pub use types::{Claim, PartitionRow, PartitionStatus, StatusCounts};

/// Error text recorded on partitions reclaimed by the timeout sweep.
pub const TIMED_OUT: &str = "Timed out";

#[cfg(test)]
pub(crate) use db::open_memory_with_clock;
