//! Initialize the local cardsync database.
//!
//! The database lives at `~/.cardsync/data/cardsync.db` unless `--db` or
//! `CARDSYNC_DB` point elsewhere. With `CARDSYNC_TEST_DB=1` it goes to
//! `~/.cardsync/test/cardsync.db` instead. Backups and run locks are kept
//! in directories beside the database.

use crate::config::{lock_dir, resolve_backup_dir, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    backup_dir: PathBuf,
    lock_dir: PathBuf,
    reinitialized: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if the directories or database cannot be created.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    let existed = db_path.exists();
    if existed && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if existed {
        remove_database(&db_path)?;
    }

    // Opening applies the schema.
    let storage = SqliteStorage::open(&db_path)?;
    drop(storage);

    let backup_dir = resolve_backup_dir(&db_path);
    let lock_dir = lock_dir(&db_path);
    fs::create_dir_all(&backup_dir)?;
    fs::create_dir_all(&lock_dir)?;

    if json {
        let output = InitOutput {
            database: db_path,
            backup_dir,
            lock_dir,
            reinitialized: existed,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized cardsync database");
        println!("  Database: {}", db_path.display());
        println!("  Backups:  {}", backup_dir.display());
        println!();
        println!("Next: set an API key with 'cardsync config set-key <key>'.");
    }

    Ok(())
}

/// Remove a database file and its WAL sidecars.
fn remove_database(db_path: &Path) -> Result<()> {
    fs::remove_file(db_path)?;
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            fs::remove_file(sidecar)?;
        }
    }
    Ok(())
}
