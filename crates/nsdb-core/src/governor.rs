//! Backpressure governor.
//!
//! Reads the outstanding-partition count and data-directory disk usage,
//! reclaims timed-out partitions, deletes finished partition files, and holds
//! acquisition back while either limit is exceeded. Store errors and disk
//! measurement errors never escape: they map to values that keep the loop
//! moving (zero outstanding) or shed load (disk full).

use std::path::PathBuf;
use std::time::Duration;

use crate::config::NsdbConfig;
use crate::disk;
use crate::job_store::{JobStore, PartitionStatus, TIMED_OUT};

/// One reading of the governed quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub outstanding: i64,
    pub disk_usage: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_outstanding: i64,
    pub max_disk: u64,
}

impl Snapshot {
    pub fn over(&self, limits: &Limits) -> bool {
        self.outstanding > limits.max_outstanding || self.disk_usage > limits.max_disk
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub timed_out: u64,
    pub cleaned: usize,
}

#[derive(Clone)]
pub struct Governor {
    store: JobStore,
    data_dir: PathBuf,
    partitions_dir: PathBuf,
    limits: Limits,
    stale_after: Duration,
    interval: Duration,
}

impl Governor {
    pub fn new(cfg: &NsdbConfig, instances: usize, store: JobStore) -> Self {
        let per_instance = i64::try_from(cfg.throttle.outstanding_per_instance).unwrap_or(i64::MAX);
        Self {
            store,
            data_dir: cfg.data_dir.clone(),
            partitions_dir: cfg.partitions_dir(),
            limits: Limits {
                max_outstanding: per_instance.saturating_mul(instances.max(1) as i64),
                max_disk: cfg.max_space_bytes(),
            },
            stale_after: cfg.throttle.stale_after(),
            interval: cfg.throttle.throttle_interval(),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub async fn snapshot(&self) -> Snapshot {
        let outstanding = match self.store.count_by_status(PartitionStatus::Todo).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("outstanding count unavailable, assuming none: {:#}", e);
                0
            }
        };
        let data_dir = self.data_dir.clone();
        let disk_usage = tokio::task::spawn_blocking(move || disk::usage_or_full(&data_dir))
            .await
            .unwrap_or(disk::UNMEASURABLE);
        Snapshot {
            outstanding,
            disk_usage,
        }
    }

    /// Reclaim partitions running longer than the stale threshold, then drop
    /// finished rows and delete their files.
    pub async fn sweep(&self) -> Sweep {
        let mut sweep = Sweep::default();
        match self.store.mark_stale(self.stale_after, TIMED_OUT).await {
            Ok(n) => {
                if n > 0 {
                    tracing::info!(partitions = n, "timed out stale partitions");
                }
                sweep.timed_out = n;
            }
            Err(e) => tracing::warn!("stale sweep skipped: {:#}", e),
        }

        let partitions_dir = &self.partitions_dir;
        match self
            .store
            .list_and_delete(PartitionStatus::Done, |name| {
                std::fs::remove_file(partitions_dir.join(name))
            })
            .await
        {
            Ok(names) => sweep.cleaned = names.len(),
            Err(e) => {
                tracing::warn!("cleanup skipped: {:#}", e);
                return sweep;
            }
        }
        if sweep.cleaned > 0 {
            tracing::debug!(files = sweep.cleaned, "deleted finished partitions");
        }
        sweep
    }

    /// Sweep and sleep until both limits clear, or until nothing is
    /// outstanding. Returns the number of throttled rounds.
    pub async fn throttle(&self) -> u32 {
        let mut rounds = 0;
        loop {
            let snap = self.snapshot().await;
            if !snap.over(&self.limits) || snap.outstanding == 0 {
                if rounds > 0 {
                    tracing::info!(rounds, "throttle cleared");
                }
                return rounds;
            }
            tracing::info!(
                outstanding = snap.outstanding,
                max_outstanding = self.limits.max_outstanding,
                disk = snap.disk_usage,
                max_disk = self.limits.max_disk,
                "throttling"
            );
            self.sweep().await;
            tokio::time::sleep(self.interval).await;
            rounds += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::job_store::open_memory_with_clock;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        cfg: NsdbConfig,
        clock: Arc<ManualClock>,
        store: JobStore,
    }

    async fn fixture(max_space_gb: u64, outstanding_per_instance: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = NsdbConfig::default();
        cfg.data_dir = dir.path().join("data");
        cfg.max_space_gb = max_space_gb;
        cfg.throttle.outstanding_per_instance = outstanding_per_instance;
        cfg.throttle.throttle_interval_secs = 0.02;
        std::fs::create_dir_all(cfg.partitions_dir()).unwrap();
        let clock = Arc::new(ManualClock::from_unix(10_000));
        let store = open_memory_with_clock(clock.clone()).await.unwrap();
        Fixture {
            _dir: dir,
            cfg,
            clock,
            store,
        }
    }

    #[test]
    fn over_limits_on_either_axis() {
        let limits = Limits {
            max_outstanding: 30,
            max_disk: 100,
        };
        let ok = Snapshot {
            outstanding: 30,
            disk_usage: 100,
        };
        assert!(!ok.over(&limits));
        assert!(Snapshot { outstanding: 31, ..ok }.over(&limits));
        assert!(Snapshot { disk_usage: 101, ..ok }.over(&limits));
    }

    #[tokio::test]
    async fn outstanding_limit_scales_with_instances() {
        let fx = fixture(600, 30).await;
        let gov = Governor::new(&fx.cfg, 4, fx.store.clone());
        assert_eq!(gov.limits().max_outstanding, 120);
        assert_eq!(gov.limits().max_disk, 600_000_000_000);
    }

    #[tokio::test]
    async fn unmeasurable_disk_reads_as_full() {
        let fx = fixture(600, 30).await;
        std::fs::remove_dir_all(&fx.cfg.data_dir).unwrap();
        let gov = Governor::new(&fx.cfg, 1, fx.store.clone());
        let snap = gov.snapshot().await;
        assert_eq!(snap.disk_usage, disk::UNMEASURABLE);
        assert!(snap.over(&gov.limits()));
    }

    #[tokio::test]
    async fn sweep_times_out_and_cleans_up() {
        let fx = fixture(600, 30).await;
        let gov = Governor::new(&fx.cfg, 1, fx.store.clone());
        for name in ["a.0", "a.1"] {
            fx.store.insert_todo(name).await.unwrap();
            std::fs::write(fx.cfg.partitions_dir().join(name), "x").unwrap();
        }
        assert!(fx.store.claim("a.0", "0").await.unwrap().is_some());
        let done = fx.store.claim("a.1", "0").await.unwrap().unwrap();
        fx.store.complete(&done, true, None).await.unwrap();

        fx.clock.advance(Duration::from_secs(16 * 60));
        let sweep = gov.sweep().await;
        assert_eq!(sweep, Sweep { timed_out: 1, cleaned: 1 });

        let row = fx.store.get("a.0").await.unwrap().unwrap();
        assert_eq!(row.status, PartitionStatus::Failed);
        assert_eq!(row.error.as_deref(), Some(TIMED_OUT));
        assert!(fx.store.get("a.1").await.unwrap().is_none());
        assert!(!fx.cfg.partitions_dir().join("a.1").exists());
        assert!(fx.cfg.partitions_dir().join("a.0").exists());

        assert_eq!(gov.sweep().await, Sweep::default());
    }

    #[tokio::test]
    async fn throttle_returns_immediately_under_limits() {
        let fx = fixture(600, 30).await;
        let gov = Governor::new(&fx.cfg, 1, fx.store.clone());
        fx.store.insert_todo("a.0").await.unwrap();
        assert_eq!(gov.throttle().await, 0);
    }

    #[tokio::test]
    async fn throttle_exits_when_nothing_is_outstanding() {
        // Budget of zero bytes with a non-empty data dir: disk is over, but
        // there is no work whose completion could free space.
        let fx = fixture(0, 30).await;
        std::fs::write(fx.cfg.data_dir.join("junk"), "x").unwrap();
        let gov = Governor::new(&fx.cfg, 1, fx.store.clone());
        assert!(gov.snapshot().await.over(&gov.limits()));
        assert_eq!(gov.throttle().await, 0);
    }

    #[tokio::test]
    async fn throttle_waits_until_outstanding_drops() {
        let fx = fixture(600, 2).await;
        let gov = Governor::new(&fx.cfg, 1, fx.store.clone());
        for i in 0..4 {
            fx.store.insert_todo(&format!("a.{}", i)).await.unwrap();
        }

        let throttled = tokio::spawn({
            let gov = gov.clone();
            async move { gov.throttle().await }
        });
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!throttled.is_finished());
        assert!(fx.store.claim("a.0", "0").await.unwrap().is_some());
        assert!(fx.store.claim("a.1", "0").await.unwrap().is_some());

        let rounds = throttled.await.unwrap();
        assert!(rounds >= 1);
        assert_eq!(gov.snapshot().await.outstanding, 2);
    }

    #[tokio::test]
    async fn store_errors_read_as_nothing_outstanding() {
        let fx = fixture(600, 1).await;
        let gov = Governor::new(&fx.cfg, 1, fx.store.clone());
        for i in 0..3 {
            fx.store.insert_todo(&format!("a.{}", i)).await.unwrap();
        }
        assert!(gov.snapshot().await.over(&gov.limits()));

        fx.store.pool.close().await;
        assert!(fx.store.count_by_status(PartitionStatus::Todo).await.is_err());
        assert_eq!(gov.snapshot().await.outstanding, 0);
        assert_eq!(gov.sweep().await, Sweep::default());
        let rounds = tokio::time::timeout(Duration::from_secs(5), gov.throttle())
            .await
            .expect("throttle returns while the store is down");
        assert_eq!(rounds, 0);
    }
}
