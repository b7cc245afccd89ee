//! Streaming partitioner.
//!
//! Splits one extracted dump into at most N partition files along record
//! boundaries without holding the dump in memory. Every partition is a
//! well-formed document: the dump's own preamble, a contiguous run of whole
//! records, and the closing footer. Reading the records of all partitions in
//! emission order gives back the source record sequence.

mod records;
mod writer;

pub use records::{RecordFormat, RecordLine, RecordReader};
pub use writer::{append_to_list, temp_path, PartitionWriter};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

const READ_BUF: usize = 1024 * 1024;

/// Result of splitting one dump.
#[derive(Debug, Clone, Default)]
pub struct SplitSummary {
    /// Partition names in emission order.
    pub partitions: Vec<String>,
    pub records: usize,
    /// Line count of the source used to size chunks.
    pub source_lines: u64,
}

/// Count newline-terminated lines (plus a trailing unterminated one).
pub fn count_lines(path: &Path) -> Result<u64> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut buf = vec![0u8; READ_BUF];
    let mut lines = 0u64;
    let mut last = b'\n';
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = buf[n - 1];
    }
    if last != b'\n' {
        lines += 1;
    }
    Ok(lines)
}

/// Line threshold after which the current partition is cut at the next record close.
pub fn chunk_size(total_lines: u64, partitions: usize, undershoot: f64) -> f64 {
    (total_lines as f64 / partitions.max(1) as f64) * undershoot
}

/// Partition file name for chunk `index` of `dump_name`.
pub fn partition_name(dump_name: &str, index: usize) -> String {
    format!("{}.{}", dump_name, index)
}

#[derive(Debug, Clone)]
pub struct Partitioner {
    pub format: RecordFormat,
    pub partitions: usize,
    pub undershoot: f64,
    pub output_dir: PathBuf,
    /// Plain-text list every emitted partition name is appended to.
    pub list_path: PathBuf,
    pub delete_source: bool,
}

impl Partitioner {
    pub fn new(output_dir: impl Into<PathBuf>, list_path: impl Into<PathBuf>, partitions: usize) -> Self {
        Self {
            format: RecordFormat::default(),
            partitions: partitions.max(1),
            undershoot: 0.75,
            output_dir: output_dir.into(),
            list_path: list_path.into(),
            delete_source: false,
        }
    }

    pub fn with_undershoot(mut self, undershoot: f64) -> Self {
        self.undershoot = undershoot;
        self
    }

    pub fn with_delete_source(mut self, delete: bool) -> Self {
        self.delete_source = delete;
        self
    }

    /// Split `source` into partitions, calling `on_emit` with each partition
    /// name once its file is complete and listed. Blocking; run it on the
    /// blocking pool from async code.
    pub fn split_file<F>(&self, source: &Path, mut on_emit: F) -> Result<SplitSummary>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let dump_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("dump path has no file name: {}", source.display()))?;

        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("create {}", self.output_dir.display()))?;

        let source_lines = count_lines(source)?;
        let chunk = chunk_size(source_lines, self.partitions, self.undershoot);
        tracing::debug!(
            dump = %dump_name,
            lines = source_lines,
            chunk,
            partitions = self.partitions,
            "splitting dump"
        );

        let file = File::open(source).with_context(|| format!("open {}", source.display()))?;
        let mut reader = RecordReader::new(BufReader::with_capacity(READ_BUF, file), self.format.clone());
        let header = reader.header()?.to_string();

        let mut summary = SplitSummary {
            source_lines,
            ..SplitSummary::default()
        };
        let mut current: Option<PartitionWriter> = None;
        let mut lines_in_chunk = 0u64;

        while let Some(kind) = reader
            .next_line()
            .with_context(|| format!("read records from {}", source.display()))?
        {
            let index = summary.partitions.len();
            if current.is_none() {
                current = Some(PartitionWriter::create(
                    &self.output_dir,
                    &partition_name(&dump_name, index),
                    &header,
                )?);
            }
            let Some(writer) = current.as_mut() else {
                continue;
            };
            writer.write_line(reader.line(), kind)?;
            lines_in_chunk += 1;
            if kind != RecordLine::Close {
                continue;
            }
            summary.records += 1;

            // The last permitted partition takes whatever is left.
            let is_last = index + 1 >= self.partitions;
            if lines_in_chunk as f64 > chunk && !is_last {
                if let Some(w) = current.take() {
                    self.emit(w, &mut summary, &mut on_emit)?;
                }
                lines_in_chunk = 0;
            }
        }
        if let Some(w) = current.take() {
            self.emit(w, &mut summary, &mut on_emit)?;
        }

        if self.delete_source {
            std::fs::remove_file(source)
                .with_context(|| format!("delete dump {}", source.display()))?;
        }

        tracing::info!(
            dump = %dump_name,
            partitions = summary.partitions.len(),
            records = summary.records,
            "split complete"
        );
        Ok(summary)
    }

    fn emit<F>(&self, writer: PartitionWriter, summary: &mut SplitSummary, on_emit: &mut F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let records = writer.records();
        let name = writer.finish(&self.format.footer)?;
        tracing::debug!(partition = %name, records, "partition written");
        append_to_list(&self.list_path, &name)?;
        on_emit(&name)?;
        summary.partitions.push(name);
        Ok(())
    }
}
