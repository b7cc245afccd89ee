//! HTTP transport for the dump index and archive downloads (libcurl).
//!
//! Blocking; call from `spawn_blocking` when used from async code.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::AcquireError;

pub trait Transport: Send + Sync {
    /// GET `url` and return the body as text.
    fn get_text(&self, url: &str) -> Result<String>;

    /// GET `url` into `dest`. Skips the transfer when `dest` already exists.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CurlTransport {
    pub connect_timeout: Duration,
    /// Abort when throughput stays under 1 KiB/s for this long.
    pub low_speed_time: Duration,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_time: Duration::from_secs(120),
        }
    }
}

impl CurlTransport {
    fn easy(&self, url: &str) -> Result<curl::easy::Easy> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url).context("invalid URL")?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(self.low_speed_time)?;
        Ok(easy)
    }

    fn check_status(easy: &mut curl::easy::Easy, url: &str) -> Result<()> {
        let code = easy.response_code().context("no response code")?;
        if !(200..300).contains(&code) {
            return Err(AcquireError::Http {
                url: url.to_string(),
                code,
            }
            .into());
        }
        Ok(())
    }
}

impl Transport for CurlTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        let mut body: Vec<u8> = Vec::new();
        let mut easy = self.easy(url)?;
        easy.timeout(Duration::from_secs(120))?;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer
                .perform()
                .with_context(|| format!("GET {} failed", url))?;
        }
        Self::check_status(&mut easy, url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            tracing::debug!(path = %dest.display(), "archive already present, skipping download");
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = part_path(dest);
        if let Err(e) = self.fetch_into(url, &temp) {
            if let Err(rm) = fs::remove_file(&temp) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %temp.display(), error = %rm, "failed to remove partial download");
                }
            }
            return Err(e);
        }
        fs::rename(&temp, dest)
            .with_context(|| format!("failed to rename {} to {}", temp.display(), dest.display()))?;
        Ok(())
    }
}

impl CurlTransport {
    /// Transfer `url` into `temp`. The caller owns cleanup of `temp` on error.
    fn fetch_into(&self, url: &str, temp: &Path) -> Result<()> {
        let mut file =
            File::create(temp).with_context(|| format!("create {}", temp.display()))?;
        let mut write_err: Option<std::io::Error> = None;

        let mut easy = self.easy(url)?;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| match file.write_all(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    write_err = Some(e);
                    Ok(0) // abort transfer
                }
            })?;
            let performed = transfer.perform();
            performed
        };
        if let Some(e) = write_err.take() {
            return Err(e).with_context(|| format!("write {}", temp.display()));
        }
        performed.with_context(|| format!("GET {} failed", url))?;
        Self::check_status(&mut easy, url)?;

        file.sync_all().context("archive sync failed")?;
        Ok(())
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut o = dest.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}
