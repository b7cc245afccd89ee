//! Worker pool sizing from available cores.

/// Pool sizes derived for one orchestrator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    /// Cores usable after subtracting the reserved ones (at least 1).
    pub cores: usize,
    pub parse_workers: usize,
    pub split_workers: usize,
    /// Partitions each dump is split into.
    pub partitions_per_dump: usize,
}

impl PoolSizing {
    /// Size pools for `available` cores with `free` held back.
    ///
    /// One core is left for the orchestrator itself and, on machines with
    /// more than four cores, two more for splitting; parse workers are capped
    /// at 10. When several instances share a job store each one runs at most
    /// three split workers.
    pub fn compute(available: usize, free: usize, instances: usize, partitions_per_parse_worker: usize) -> Self {
        let cores = available.saturating_sub(free).max(1);

        let parse_workers = if cores > 4 {
            cores.saturating_sub(3).clamp(1, 10)
        } else {
            cores.saturating_sub(2).max(1)
        };

        let spare = cores.saturating_sub(1).saturating_sub(parse_workers);
        let split_workers = if instances > 1 {
            spare.clamp(1, 3)
        } else {
            spare.max(1)
        };

        Self {
            cores,
            parse_workers,
            split_workers,
            partitions_per_dump: partitions_per_parse_worker.max(1) * parse_workers,
        }
    }

    /// Size pools for this machine.
    pub fn detect(free: usize, instances: usize, partitions_per_parse_worker: usize) -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::compute(available, free, instances, partitions_per_parse_worker)
    }
}
