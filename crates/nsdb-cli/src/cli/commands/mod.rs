//! CLI command handlers, one file per command.

mod requeue;
mod run;
mod split;
mod status;

pub use requeue::run_requeue;
pub use run::run_pipeline;
pub use split::run_split;
pub use status::run_status;
