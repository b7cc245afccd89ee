//! Disk usage of the data directory.

use std::path::Path;

/// Reported when the data directory cannot be measured, so the governor
/// treats the disk as full.
pub const UNMEASURABLE: u64 = u64::MAX;

/// Total apparent size in bytes of every regular file under `dir`.
pub fn dir_size(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            // Files vanish while workers clean up; only the root failing matters.
            Err(e) if e.depth() > 0 => continue,
            Err(e) => return Err(e.into()),
        };
        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(m) => total = total.saturating_add(m.len()),
                Err(_) => continue,
            }
        }
    }
    Ok(total)
}

/// Like [`dir_size`] but never fails: measurement errors map to [`UNMEASURABLE`].
pub fn usage_or_full(dir: &Path) -> u64 {
    match dir_size(dir) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "disk usage unavailable, assuming full: {}", e);
            UNMEASURABLE
        }
    }
}
