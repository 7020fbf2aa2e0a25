//! Per-deck run lock.
//!
//! Only one sync (push, pull, both or repair) may run against a given
//! database + deck pair at a time. The lock is an advisory exclusive
//! file lock held for the whole run and released on drop, so a crashed
//! process never leaves a stale lock behind.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Who holds a lock; written into the lock file for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub deck_id: String,
}

/// Exclusive lock for one deck's sync runs.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Lock file path for a deck inside `lock_dir`.
    #[must_use]
    pub fn path_for(lock_dir: &Path, deck_id: &str) -> PathBuf {
        let safe: String = deck_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        lock_dir.join(format!("{safe}.lock"))
    }

    /// Take the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if another run holds it, or an I/O error
    /// if the lock file cannot be created.
    pub fn acquire(lock_dir: &Path, deck_id: &str) -> Result<Self> {
        fs::create_dir_all(lock_dir)?;
        let path = Self::path_for(lock_dir, deck_id);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                return Err(Error::SyncInProgress {
                    deck_id: deck_id.to_string(),
                    lock_path: path,
                });
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            deck_id: deck_id.to_string(),
        };
        file.set_len(0)?;
        file.write_all(serde_json::to_string(&holder)?.as_bytes())?;

        debug!(path = %path.display(), "acquired sync lock");
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("failed to release sync lock: {e}");
        }
        debug!(path = %self.path.display(), "released sync lock");
    }
}
