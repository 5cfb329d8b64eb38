//! Blocking artifact download into the filename-keyed download cache.
//!
//! A file is fetched once per file name: if `<dest_dir>/<filename>` already
//! exists it is reused without contacting the network, unless the URL
//! advertises a digest the cached file does not match. Fresh downloads are
//! streamed into a temporary file in the same directory and renamed into
//! place while the directory lock is held, so a partially written artifact
//! is never visible under its final name. When the URL carries a
//! `#sha256=<hex>` fragment (as simple-index links do) the streamed bytes
//! are verified before the rename.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::lock::DirLock;

/// Errors raised while fetching an artifact.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport or HTTP status failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The downloaded bytes do not match the advertised digest.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Digest from the URL fragment.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },

    /// The URL has no file name component.
    #[error("URL has no file name: {0}")]
    NoFileName(String),
}

/// Extract the last path segment of a URL.
pub fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The `sha256=<hex>` digest advertised in a URL fragment, if any.
pub fn expected_sha256(url: &Url) -> Option<String> {
    url.fragment()?
        .strip_prefix("sha256=")
        .map(str::to_ascii_lowercase)
}

fn file_sha256(path: &Path) -> Result<String, DownloadError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether the cached file at `dest` can stand in for `url`.
fn is_reusable(dest: &Path, url: &Url) -> Result<bool, DownloadError> {
    if !dest.is_file() {
        return Ok(false);
    }
    let Some(expected) = expected_sha256(url) else {
        return Ok(true);
    };
    let actual = file_sha256(dest)?;
    if actual != expected {
        warn!(path = %dest.display(), %expected, %actual, "cached file does not match digest");
        return Ok(false);
    }
    Ok(true)
}

/// Fetch `url` into `dest_dir`, reusing an existing file of the same name.
pub fn fetch(client: &Client, url: &Url, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
    let filename =
        filename_from_url(url).ok_or_else(|| DownloadError::NoFileName(url.to_string()))?;
    let dest = dest_dir.join(&filename);
    if is_reusable(&dest, url)? {
        debug!(path = %dest.display(), "reusing cached download");
        return Ok(dest);
    }

    fs::create_dir_all(dest_dir)?;
    let _lock = DirLock::acquire(dest_dir)?;
    // Another process may have finished the same download while we waited.
    if is_reusable(&dest, url)? {
        debug!(path = %dest.display(), "download completed by another process");
        return Ok(dest);
    }

    let mut source_url = url.clone();
    source_url.set_fragment(None);
    info!(url = %source_url, "downloading {filename}");

    let mut response = client.get(source_url).send()?.error_for_status()?;
    let mut temp = tempfile::NamedTempFile::new_in(dest_dir)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = response.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        temp.write_all(&buffer[..read])?;
    }
    temp.flush()?;

    if let Some(expected) = expected_sha256(url) {
        let actual = hex::encode(hasher.finalize());
        if actual != expected {
            return Err(DownloadError::HashMismatch { expected, actual });
        }
    }

    temp.persist(&dest).map_err(|e| DownloadError::Io(e.error))?;
    Ok(dest)
}
