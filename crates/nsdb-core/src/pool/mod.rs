//! Worker pool coordinator.
//!
//! Two fixed-size pools per instance: split workers fed by a bounded queue of
//! extracted dumps, and parse workers that claim partitions from the job
//! store. Task failures are reported, logged, and never tear a pool down.

mod parse;
mod report;
mod sizing;
mod split;

pub use parse::{CommandParser, ParseContext, ParsePool, RecordParser};
pub use report::{ErrorSink, SinkStats, TaskKind, TaskReport};
pub use sizing::PoolSizing;
pub use split::{split_one, SplitPool};
