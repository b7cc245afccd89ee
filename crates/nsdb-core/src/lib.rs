pub mod config;
pub mod logging;

pub mod acquisition;
pub mod clock;
pub mod disk;
pub mod governor;
pub mod job_store;
pub mod orchestrator;
pub mod partitioner;
pub mod pool;
