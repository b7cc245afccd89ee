//! Mirror selection interface.
//!
//! The controller only asks for a base URL to download a given dump entry
//! from; how the mirror is chosen (speed probing, round robin) lives behind
//! this trait.

use anyhow::Result;

pub trait MirrorSelector: Send + Sync {
    /// Base URL (ending in `/`) that serves `entry`.
    fn endpoint(&self, entry: &str) -> Result<String>;
}

/// Always returns the same mirror.
#[derive(Debug, Clone)]
pub struct FixedMirror {
    base: String,
}

impl FixedMirror {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self { base }
    }
}

impl MirrorSelector for FixedMirror {
    fn endpoint(&self, _entry: &str) -> Result<String> {
        Ok(self.base.clone())
    }
}

/// Resolve `entry` (a path relative to the mirror root) against `endpoint`.
pub fn entry_url(endpoint: &str, entry: &str) -> Result<String> {
    let base = url::Url::parse(endpoint)?;
    Ok(base.join(entry.trim_start_matches('/'))?.to_string())
}
