//! Writes one partition file: header, record lines, footer.
//!
//! Content goes to `<name>.part` and is renamed into place on finish, so a
//! partition visible under its final name is always complete.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::records::RecordLine;

const WRITE_BUF: usize = 256 * 1024;

/// Path for the temp file: appends `.part` to the final path.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}

pub struct PartitionWriter {
    out: BufWriter<File>,
    name: String,
    temp_path: PathBuf,
    final_path: PathBuf,
    records: usize,
}

impl PartitionWriter {
    pub fn create(dir: &Path, name: &str, header: &str) -> Result<Self> {
        let final_path = dir.join(name);
        let temp_path = temp_path(&final_path);
        let file = File::create(&temp_path)
            .with_context(|| format!("create partition {}", temp_path.display()))?;
        let mut out = BufWriter::with_capacity(WRITE_BUF, file);
        out.write_all(header.as_bytes())?;
        Ok(Self {
            out,
            name: name.to_string(),
            temp_path,
            final_path,
            records: 0,
        })
    }

    /// Append one record line as read from the dump. A close line completes a record.
    pub fn write_line(&mut self, line: &str, kind: RecordLine) -> Result<()> {
        self.out
            .write_all(line.as_bytes())
            .with_context(|| format!("write partition {}", self.temp_path.display()))?;
        if kind == RecordLine::Close {
            self.records += 1;
        }
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    /// Write the footer, flush, and rename into place. Returns the partition name.
    pub fn finish(mut self, footer: &str) -> Result<String> {
        self.out.write_all(footer.as_bytes())?;
        let file = self
            .out
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flush partition {}: {}", self.temp_path.display(), e))?;
        file.sync_all().context("partition sync failed")?;
        drop(file);
        fs::rename(&self.temp_path, &self.final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                self.temp_path.display(),
                self.final_path.display()
            )
        })?;
        Ok(self.name)
    }
}

/// Append one partition name to the plain-text partition list.
pub fn append_to_list(list_path: &Path, name: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(list_path)
        .with_context(|| format!("open partition list {}", list_path.display()))?;
    writeln!(f, "{}", name)?;
    Ok(())
}
