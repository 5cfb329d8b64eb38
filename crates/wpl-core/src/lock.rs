//! Scoped advisory directory locks.
//!
//! Every mutation of the download cache, the pool and the links record
//! happens while holding a [`DirLock`] on the directory being changed. The
//! lock is an exclusive `fs4` lock on a `.lock` file inside that directory
//! and is released when the guard is dropped, on success and failure alike.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

const LOCK_FILE_NAME: &str = ".lock";

/// RAII guard for an exclusive directory lock.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Block until the lock on `dir` is acquired, creating `dir` if needed.
    pub fn acquire(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        FileExt::lock_exclusive(&file)?;
        debug!(lock = %path.display(), "acquired directory lock");
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

/// Whether a directory entry is a lock file rather than content.
pub fn is_lock_file(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == LOCK_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pool");
        {
            let lock = DirLock::acquire(&dir).unwrap();
            assert!(lock.path().is_file());
            assert!(is_lock_file(lock.path()));
        }
        let _again = DirLock::acquire(&dir).unwrap();
    }
}
