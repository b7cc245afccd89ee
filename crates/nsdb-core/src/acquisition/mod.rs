//! Acquisition controller: manifest → download → extract.
//!
//! Resolves the next dump to fetch from the manifest, downloads it through
//! the mirror selector and transport, and decompresses it into the dumps
//! directory. Every step skips work that is already satisfied on disk, so
//! repeating a step for the same manifest head transfers nothing new.
//! Failures propagate; nothing here retries.

mod error;
mod extract;
mod index;
mod manifest;
mod mirror;
mod transport;

pub use error::AcquireError;
pub use extract::{Extractor, SevenZip};
pub use index::{index_page_url, parse_index};
pub use manifest::DumpManifest;
pub use mirror::{entry_url, FixedMirror, MirrorSelector};
pub use transport::{CurlTransport, Transport};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::NsdbConfig;

/// Where a dump index lives and which entries to keep from it.
#[derive(Debug, Clone)]
pub struct IndexSource {
    pub root: String,
    pub wiki: String,
    pub snapshot: String,
    pub pattern: String,
}

#[derive(Clone)]
pub struct AcquisitionController {
    manifest: DumpManifest,
    index: IndexSource,
    archive_suffix: String,
    archives_dir: PathBuf,
    dumps_dir: PathBuf,
    mirror: Arc<dyn MirrorSelector>,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn Extractor>,
}

impl AcquisitionController {
    pub fn new(
        cfg: &NsdbConfig,
        mirror: Arc<dyn MirrorSelector>,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        Self {
            manifest: DumpManifest::new(cfg.manifest_path()),
            index: IndexSource {
                root: cfg.index_url.clone(),
                wiki: cfg.wiki.clone(),
                snapshot: cfg.snapshot.clone(),
                pattern: cfg.dump_pattern.clone(),
            },
            archive_suffix: cfg.archive_suffix.clone(),
            archives_dir: cfg.archives_dir(),
            dumps_dir: cfg.dumps_dir(),
            mirror,
            transport,
            extractor,
        }
    }

    /// Controller wired to the fixed mirror, libcurl and 7z.
    pub fn with_defaults(cfg: &NsdbConfig) -> Self {
        Self::new(
            cfg,
            Arc::new(FixedMirror::new(cfg.mirror_url.clone())),
            Arc::new(CurlTransport::default()),
            Arc::new(SevenZip::default()),
        )
    }

    pub fn manifest(&self) -> &DumpManifest {
        &self.manifest
    }

    pub fn dumps_dir(&self) -> &Path {
        &self.dumps_dir
    }

    /// Build the manifest from the remote dump index if it does not exist yet.
    pub async fn ensure_manifest(&self) -> Result<()> {
        if self.manifest.exists() {
            return Ok(());
        }
        let url = index_page_url(&self.index.root, &self.index.wiki, &self.index.snapshot);
        let html = tokio::task::spawn_blocking({
            let transport = Arc::clone(&self.transport);
            let url = url.clone();
            move || transport.get_text(&url)
        })
        .await
        .context("index task join")?
        .with_context(|| format!("fetch dump index {}", url))?;

        let entries = parse_index(&html, &self.index.pattern, &self.archive_suffix);
        if entries.is_empty() {
            return Err(AcquireError::EmptyIndex {
                url,
                pattern: self.index.pattern.clone(),
            }
            .into());
        }
        self.manifest.write_all(&entries)?;
        tracing::info!(
            path = %self.manifest.path().display(),
            dumps = entries.len(),
            "wrote dump manifest"
        );
        Ok(())
    }

    /// Archive file name with the compression suffix removed.
    pub fn decompressed_name(&self, archive_name: &str) -> String {
        archive_name
            .strip_suffix(self.archive_suffix.as_str())
            .unwrap_or(archive_name)
            .to_string()
    }

    /// Extracted dumps currently on disk.
    pub fn local_dumps(&self) -> usize {
        std::fs::read_dir(&self.dumps_dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Pop the manifest head and download it unless its extracted form is
    /// already present. Returns the archive file name, or None when the
    /// manifest is exhausted.
    pub async fn download_next(&self) -> Result<Option<String>> {
        let Some(entry) = self.manifest.pop_front()? else {
            return Ok(None);
        };
        let file_name = entry
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AcquireError::BadEntry(entry.clone()))?;

        let extracted = self.dumps_dir.join(self.decompressed_name(&file_name));
        if extracted.exists() {
            tracing::info!(dump = %file_name, "already extracted, skipping download");
            return Ok(Some(file_name));
        }

        let tick = Instant::now();
        let dest = self.archives_dir.join(&file_name);
        tokio::task::spawn_blocking({
            let mirror = Arc::clone(&self.mirror);
            let transport = Arc::clone(&self.transport);
            let entry = entry.clone();
            move || -> Result<()> {
                let endpoint = mirror.endpoint(&entry)?;
                let url = entry_url(&endpoint, &entry)?;
                tracing::debug!(url = %url, "downloading archive");
                transport.download(&url, &dest)
            }
        })
        .await
        .context("download task join")?
        .with_context(|| format!("download {}", entry))?;

        tracing::info!(
            dump = %file_name,
            secs = tick.elapsed().as_secs_f64(),
            "download finished"
        );
        Ok(Some(file_name))
    }

    /// Decompress `archive_name` into the dumps directory unless already
    /// there, then delete the archive. Returns the extracted file name.
    pub async fn extract(&self, archive_name: &str) -> Result<String> {
        let name = self.decompressed_name(archive_name);
        let extracted = self.dumps_dir.join(&name);
        let archive = self.archives_dir.join(archive_name);

        if !extracted.exists() {
            let tick = Instant::now();
            tokio::task::spawn_blocking({
                let extractor = Arc::clone(&self.extractor);
                let archive = archive.clone();
                let out_dir = self.dumps_dir.clone();
                move || extractor.extract(&archive, &out_dir)
            })
            .await
            .context("extract task join")?
            .with_context(|| format!("extract {}", archive.display()))?;

            if !extracted.exists() {
                return Err(AcquireError::MissingOutput(extracted).into());
            }
            tracing::info!(
                dump = %name,
                secs = tick.elapsed().as_secs_f64(),
                "extraction finished"
            );
        }

        match tokio::fs::remove_file(&archive).await {
            Ok(()) => tracing::debug!(path = %archive.display(), "deleted archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %archive.display(), "could not delete archive: {}", e),
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests;
