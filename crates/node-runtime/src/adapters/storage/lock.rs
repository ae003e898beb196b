//! # Data Directory Lock
//!
//! Two nodes writing one RocksDB directory would corrupt it, so the runtime
//! takes an exclusive `fs2` lock on `<data_dir>/LOCK` before opening the
//! store. The lock is released when [`DataDirLock`] is dropped or the
//! process exits.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to create lock file {path}: {source}")]
    CreateFailed { path: PathBuf, source: io::Error },

    #[error("data directory {} already in use{}", .path.display(), owner_suffix(.pid))]
    AlreadyLocked { path: PathBuf, pid: Option<u32> },
}

fn owner_suffix(pid: &Option<u32>) -> String {
    pid.map(|pid| format!(" by process {pid}"))
        .unwrap_or_default()
}

/// Exclusive lock on a data directory, held until dropped.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    const LOCK_FILE: &'static str = "LOCK";

    /// Create `data_dir` if needed and lock it without blocking.
    pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
        let path = data_dir.join(Self::LOCK_FILE);
        let create_failed = |source| LockError::CreateFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(data_dir).map_err(create_failed)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(create_failed)?;

        if file.try_lock_exclusive().is_err() {
            let pid = std::fs::read_to_string(&path)
                .ok()
                .and_then(|text| text.trim().parse().ok());
            return Err(LockError::AlreadyLocked {
                path: path.clone(),
                pid,
            });
        }

        file.set_len(0).map_err(create_failed)?;
        write!(file, "{}", std::process::id()).map_err(create_failed)?;
        file.sync_all().map_err(create_failed)?;
        debug!(path = %path.display(), "data directory locked");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release data directory lock");
        }
    }
}
