// SPDX-License-Identifier: MIT

//! Archive fetcher/extractor: downloads `url` to a temp file, then
//! unpacks it into `dest_dir`. Pluggable behind [`ArchiveFetcher`] so
//! tests (and alternative deployments) can swap in a fake.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

/// Category of a fetch failure, surfaced to the descriptor's `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorCategory {
    Network,
    HttpStatus,
    Io,
    ArchiveFormat,
    PathEscape,
    Timeout,
}

outpost_core::simple_display! {
    FetchErrorCategory {
        Network => "network",
        HttpStatus => "http-status",
        Io => "io",
        ArchiveFormat => "archive-format",
        PathEscape => "path-escape",
        Timeout => "timeout",
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("fetch-error[{category}]: {detail}")]
pub struct FetchError {
    pub category: FetchErrorCategory,
    pub detail: String,
}

impl FetchError {
    pub fn new(category: FetchErrorCategory, detail: impl Into<String>) -> Self {
        Self { category, detail: detail.into() }
    }
}

/// Ceiling on the whole fetch+extract operation.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` and unpack it into `dest_dir`, which the caller
    /// guarantees is a fresh, empty directory.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError>;
}

/// Default fetcher: HTTP(S) download via `reqwest`, extraction via `zip`
/// or `tar`+gzip depending on the response's apparent archive kind.
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpArchiveFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), timeout }
    }
}

impl Default for HttpArchiveFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError> {
        tokio::time::timeout(self.timeout, self.fetch_inner(url, dest_dir))
            .await
            .map_err(|_| FetchError::new(FetchErrorCategory::Timeout, "fetch exceeded timeout"))?
    }
}

impl HttpArchiveFetcher {
    async fn fetch_inner(&self, url: &str, dest_dir: &Path) -> Result<(), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::new(FetchErrorCategory::Network, e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::new(
                FetchErrorCategory::HttpStatus,
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::new(FetchErrorCategory::Network, e.to_string()))?;

        let dest_dir = dest_dir.to_path_buf();
        let is_zip = bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06");
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            if is_zip {
                extract_zip(&bytes, &dest_dir)
            } else {
                extract_tar_gz(&bytes, &dest_dir)
            }
        })
        .await
        .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?
    }
}

/// Rejects any entry whose normalized path would escape `dest_dir`.
fn safe_join(dest_dir: &Path, entry_path: &Path) -> Result<PathBuf, FetchError> {
    use std::path::Component;

    let mut normalized = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FetchError::new(
                    FetchErrorCategory::PathEscape,
                    format!("archive entry escapes destination: {}", entry_path.display()),
                ));
            }
        }
    }
    Ok(dest_dir.join(normalized))
}

fn extract_zip(bytes: &[u8], dest_dir: &Path) -> Result<(), FetchError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| FetchError::new(FetchErrorCategory::ArchiveFormat, e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FetchError::new(FetchErrorCategory::ArchiveFormat, e.to_string()))?;
        let Some(entry_path) = entry.enclosed_name() else {
            return Err(FetchError::new(
                FetchErrorCategory::PathEscape,
                "archive entry has no safe name".to_string(),
            ));
        };
        let out_path = safe_join(dest_dir, &entry_path)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
        }
        let mut out_file = std::fs::File::create(&out_path)
            .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
    }
    Ok(())
}

fn extract_tar_gz(bytes: &[u8], dest_dir: &Path) -> Result<(), FetchError> {
    // Accept both gzip-compressed and plain tar: try gunzip, fall back to raw.
    let mut decompressed = Vec::new();
    let is_gzip = bytes.starts_with(&[0x1f, 0x8b]);
    let tar_bytes: &[u8] = if is_gzip {
        // Extraction already runs on a `spawn_blocking` thread, so a plain
        // synchronous gzip reader is simpler here than threading an async
        // one through.
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| FetchError::new(FetchErrorCategory::ArchiveFormat, e.to_string()))?;
        &decompressed
    } else {
        bytes
    };

    let mut archive = tar::Archive::new(std::io::Cursor::new(tar_bytes));
    let entries = archive
        .entries()
        .map_err(|e| FetchError::new(FetchErrorCategory::ArchiveFormat, e.to_string()))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| FetchError::new(FetchErrorCategory::ArchiveFormat, e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| FetchError::new(FetchErrorCategory::ArchiveFormat, e.to_string()))?
            .to_path_buf();
        let out_path = safe_join(dest_dir, &entry_path)?;

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
        }
        let mut out_file = std::fs::File::create(&out_path)
            .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| FetchError::new(FetchErrorCategory::Io, e.to_string()))?;
    }
    Ok(())
}
