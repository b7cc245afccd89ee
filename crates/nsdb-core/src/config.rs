use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backpressure and scheduling knobs (optional `[throttle]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Outstanding (todo) partitions allowed per cooperating instance before throttling.
    pub outstanding_per_instance: u64,
    /// Extracted dumps kept on hand per instance before acquisition pauses.
    pub dumps_per_instance: usize,
    /// Age in seconds after which a running partition is declared timed out.
    pub stale_after_secs: u64,
    /// Sleep between rounds while throttling.
    pub throttle_interval_secs: f64,
    /// Sleep between orchestrator ticks.
    pub tick_interval_secs: f64,
    /// Sleep for an idle parse worker before it polls the store again.
    pub idle_poll_secs: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            outstanding_per_instance: 30,
            dumps_per_instance: 3,
            stale_after_secs: 15 * 60,
            throttle_interval_secs: 30.0,
            tick_interval_secs: 5.0,
            idle_poll_secs: 10.0,
        }
    }
}

impl ThrottleConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn throttle_interval(&self) -> Duration {
        secs(self.throttle_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        secs(self.tick_interval_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        secs(self.idle_poll_secs)
    }
}

/// Negative or non-finite values read as zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Partitioner tuning (optional `[split]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of `lines / partitions` used as the cut threshold. Cuts only
    /// happen at the next record close, so the real size lands above this.
    pub undershoot: f64,
    /// Partitions produced per dump for each parse worker.
    pub partitions_per_parse_worker: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            undershoot: 0.75,
            partitions_per_parse_worker: 8,
        }
    }
}

/// Global configuration loaded from `~/.config/nsdb/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsdbConfig {
    /// Wiki database name, e.g. `enwiki`.
    pub wiki: String,
    /// Dump snapshot date, e.g. `20200401`.
    pub snapshot: String,
    /// Root of the dump index the manifest is built from.
    pub index_url: String,
    /// Endpoint used by the fixed mirror selector.
    pub mirror_url: String,
    /// Substring an index entry must contain to be listed in the manifest.
    pub dump_pattern: String,
    /// Compressed archive suffix; stripped to get the extracted file name.
    pub archive_suffix: String,
    /// Directory holding dumps/, archives/, partitions/, error/ and the job store.
    pub data_dir: PathBuf,
    /// Manifest of remaining archives. Defaults to `dumps.txt` next to `data_dir`.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    /// Disk budget for `data_dir` in gigabytes.
    pub max_space_gb: u64,
    /// Cores to leave unused when sizing worker pools.
    pub free_cores: usize,
    /// Namespace filter handed to the parser.
    pub namespaces: Vec<i32>,
    /// Parser program and leading arguments; the partition path is appended.
    pub parser_command: Vec<String>,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub split: SplitConfig,
}

impl Default for NsdbConfig {
    fn default() -> Self {
        Self {
            wiki: "enwiki".to_string(),
            snapshot: "20200401".to_string(),
            index_url: "https://dumps.wikimedia.org/".to_string(),
            mirror_url: "https://dumps.wikimedia.org/".to_string(),
            dump_pattern: "pages-meta-history".to_string(),
            archive_suffix: ".7z".to_string(),
            data_dir: PathBuf::from("data"),
            manifest_path: None,
            max_space_gb: 600,
            free_cores: 0,
            namespaces: vec![1],
            parser_command: vec!["nsdb-parse".to_string()],
            throttle: ThrottleConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

impl NsdbConfig {
    pub fn dumps_dir(&self) -> PathBuf {
        self.data_dir.join("dumps")
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.data_dir.join("archives")
    }

    pub fn partitions_dir(&self) -> PathBuf {
        self.data_dir.join("partitions")
    }

    pub fn error_dir(&self) -> PathBuf {
        self.data_dir.join("error")
    }

    pub fn partition_list_path(&self) -> PathBuf {
        self.data_dir.join("partitions.txt")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("jobs.db")
    }

    /// The manifest stores state rather than data, so by default it lives
    /// outside `data_dir` and is not counted against the disk budget.
    pub fn manifest_path(&self) -> PathBuf {
        if let Some(p) = &self.manifest_path {
            return p.clone();
        }
        let parent = self
            .data_dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        parent.join("dumps.txt")
    }

    /// Disk budget in bytes.
    pub fn max_space_bytes(&self) -> u64 {
        self.max_space_gb.saturating_mul(1_000_000_000)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("nsdb")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<NsdbConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = NsdbConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: NsdbConfig = toml::from_str(&data)?;
    Ok(cfg)
}
