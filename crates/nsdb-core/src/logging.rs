//! Logging init. Each pipeline instance appends to its own file under the XDG
//! state dir so cooperating instances on one host do not interleave lines.
//! Commands that are not tied to an instance share `nsdb.log`.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::orchestrator::Instance;

const DEFAULT_FILTER: &str = "info,nsdb=debug,nsdb_core=debug";

/// `nsdb-<id>.log` for a pipeline instance, `nsdb.log` otherwise.
pub fn log_file_name(instance: Option<&Instance>) -> String {
    match instance {
        Some(instance) => format!("nsdb-{}.log", instance.label()),
        None => "nsdb.log".to_string(),
    }
}

pub fn log_path(log_dir: &Path, instance: Option<&Instance>) -> PathBuf {
    log_dir.join(log_file_name(instance))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize structured logging to `~/.local/state/nsdb/<log file>` and
/// return the file's path. On failure (e.g. log dir unwritable), returns Err
/// so the caller can fall back to stderr.
pub fn init_logging(instance: Option<&Instance>) -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("nsdb")?;
    let log_dir = xdg_dirs.get_state_home().join("nsdb");
    fs::create_dir_all(&log_dir)?;

    let path = log_path(&log_dir, instance);
    let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install subscriber: {}", e))?;

    match instance {
        Some(instance) => tracing::info!(
            instance = instance.id,
            instances = instance.count,
            "nsdb logging initialized at {}",
            path.display()
        ),
        None => tracing::info!("nsdb logging initialized at {}", path.display()),
    }
    Ok(path)
}

/// Initialize logging to stderr only. Use when `init_logging` fails so the CLI doesn't crash.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_instance_gets_its_own_file() {
        let dir = Path::new("/state/nsdb");
        assert_eq!(
            log_path(dir, Some(&Instance::new(0, 4))),
            PathBuf::from("/state/nsdb/nsdb-0.log")
        );
        assert_eq!(
            log_path(dir, Some(&Instance::new(3, 4))),
            PathBuf::from("/state/nsdb/nsdb-3.log")
        );
    }

    #[test]
    fn commands_without_instance_share_default_file() {
        assert_eq!(log_file_name(None), "nsdb.log");
    }
}
