//! Dump manifest: plain text, one remaining archive path per line, consumed FIFO.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DumpManifest {
    path: PathBuf,
}

impl DumpManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Remaining entries in order. A missing manifest reads as empty.
    pub fn entries(&self) -> Result<Vec<String>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read manifest {}", self.path.display()))
            }
        };
        Ok(data
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace the manifest contents (temp file + rename).
    pub fn write_all(&self, entries: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut body = String::new();
        for e in entries {
            body.push_str(e);
            body.push('\n');
        }
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace manifest {}", self.path.display()))?;
        Ok(())
    }

    /// Remove and return the head entry. The shortened list is persisted
    /// before returning, so a crash while handling the entry drops it rather
    /// than retrying it forever.
    pub fn pop_front(&self) -> Result<Option<String>> {
        let mut entries = self.entries()?;
        if entries.is_empty() {
            return Ok(None);
        }
        let head = entries.remove(0);
        self.write_all(&entries)?;
        Ok(Some(head))
    }
}
