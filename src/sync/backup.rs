//! Backup manager.
//!
//! Every sync run starts by copying the whole local store to a new file.
//! The copy is written under a temporary name, fsynced, then renamed, so
//! a listed snapshot is always complete. Any failure is reported as
//! `BackupFailed` and the caller must not mutate anything afterwards.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::model::{BackupSnapshot, BackupTrigger};
use crate::storage::SqliteStorage;

/// Writes snapshots of the local store into one directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot the store and record the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `BackupFailed` if any step fails; no snapshot is recorded
    /// and no snapshot file (partial or complete) is left behind.
    pub fn snapshot(
        &self,
        storage: &mut SqliteStorage,
        trigger: BackupTrigger,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<BackupSnapshot> {
        let path = self.next_path(trigger);
        let partial = path.with_extension("sqlite3.partial");

        let written = write_snapshot(storage, &partial, &path);
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(Error::BackupFailed(format!(
                "{} ({})",
                e,
                self.dir.display()
            )));
        }

        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let snapshot = BackupSnapshot {
            path,
            trigger,
            reason: reason.map(str::to_string),
            created_at: chrono::Utc::now().timestamp_millis(),
            size_bytes,
        };

        if let Err(e) = storage.record_backup(&snapshot, actor) {
            let _ = fs::remove_file(&snapshot.path);
            return Err(Error::BackupFailed(format!("could not record snapshot: {e}")));
        }

        info!(
            path = %snapshot.path.display(),
            trigger = %trigger,
            size_bytes,
            "backup snapshot created"
        );
        Ok(snapshot)
    }

    fn next_path(&self, trigger: BackupTrigger) -> PathBuf {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = self
            .dir
            .join(format!("db_backup_{trigger}_{stamp}.sqlite3"));
        if path.exists() {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            self.dir
                .join(format!("db_backup_{trigger}_{stamp}_{}.sqlite3", &suffix[..8]))
        } else {
            path
        }
    }
}

fn write_snapshot(storage: &SqliteStorage, partial: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    storage.snapshot_to(partial)?;
    File::open(partial)?.sync_all()?;
    fs::rename(partial, dest)?;
    Ok(())
}
