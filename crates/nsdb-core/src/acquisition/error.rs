//! Acquisition failures. None of these are retried: the current cycle aborts.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// An external tool (e.g. 7z) ran but reported failure.
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("GET {url} returned HTTP {code}")]
    Http { url: String, code: u32 },
    #[error("no entries matching {pattern:?} in dump index {url}")]
    EmptyIndex { url: String, pattern: String },
    #[error("manifest entry has no file name: {0:?}")]
    BadEntry(String),
    #[error("extraction did not produce {}", .0.display())]
    MissingOutput(PathBuf),
}
