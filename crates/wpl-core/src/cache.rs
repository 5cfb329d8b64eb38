//! The download cache.

use std::fs;

use crate::config::Settings;
use crate::error::Result;
use crate::lock::is_lock_file;

/// Prefix of the temporary files downloads and built wheels are written to
/// before they are renamed into place.
const PARTIAL_PREFIX: &str = ".tmp";

/// File names in the distributions cache, sorted. Lock files and partial
/// writes left by interrupted runs are not distributions.
pub fn list(settings: &Settings) -> Result<Vec<String>> {
    let dir = settings.distributions_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if !path.is_file() || is_lock_file(&path) {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if !name.starts_with(PARTIAL_PREFIX) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
