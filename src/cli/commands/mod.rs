//! Command implementations.

pub mod backup;
pub mod completions;
pub mod config;
pub mod init;
pub mod note;
pub mod remote;
pub mod sync;
pub mod version;

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use std::path::PathBuf;

/// Resolve the database path and require it to exist.
pub(crate) fn existing_db_path(db_path: Option<&PathBuf>) -> Result<PathBuf> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    Ok(db_path)
}

/// Open the initialized database.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<(PathBuf, SqliteStorage)> {
    let path = existing_db_path(db_path)?;
    let storage = SqliteStorage::open(&path)?;
    Ok((path, storage))
}

/// Actor recorded in the audit trail for CLI mutations.
pub(crate) fn actor_name(actor: Option<&str>) -> String {
    actor.map_or_else(|| "cli".to_string(), str::to_string)
}
