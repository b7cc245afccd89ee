//! Archive extraction through an external tool.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

use super::error::AcquireError;

pub trait Extractor: Send + Sync {
    /// Decompress `archive` into `out_dir`. Blocking.
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()>;
}

/// Runs `7z e <archive> -o<out_dir> -aos` (flat extraction, skip existing files).
#[derive(Debug, Clone)]
pub struct SevenZip {
    pub program: String,
}

impl Default for SevenZip {
    fn default() -> Self {
        Self {
            program: "7z".to_string(),
        }
    }
}

impl Extractor for SevenZip {
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(out_dir)?;
        let mut out_flag = std::ffi::OsString::from("-o");
        out_flag.push(out_dir.as_os_str());

        let output = Command::new(&self.program)
            .arg("e")
            .arg(archive)
            .arg(out_flag)
            .arg("-aos")
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            return Err(AcquireError::ToolFailed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}
