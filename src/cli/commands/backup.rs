//! Backup command implementations.

use super::{actor_name, open_storage};
use crate::cli::BackupCommands;
use crate::config::resolve_backup_dir;
use crate::error::Result;
use crate::model::{BackupSnapshot, BackupTrigger};
use crate::sync::{BackupManager, format_size};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ListOutput<'a> {
    backups: &'a [BackupSnapshot],
    count: usize,
}

/// Execute backup commands.
pub fn execute(
    command: &BackupCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let (path, mut storage) = open_storage(db_path)?;

    match command {
        BackupCommands::Create { reason } => {
            let manager = BackupManager::new(resolve_backup_dir(&path));
            let snapshot = manager.snapshot(
                &mut storage,
                BackupTrigger::Manual,
                reason.as_deref(),
                &actor_name(actor),
            )?;

            if json {
                println!("{}", serde_json::to_string(&snapshot)?);
            } else {
                println!("Backup created: {}", snapshot.path.display());
                println!("  Size: {}", format_size(snapshot.size_bytes));
            }
        }
        BackupCommands::List { limit } => {
            let backups = storage.list_backups(Some(*limit))?;

            if json {
                let output = ListOutput {
                    backups: &backups,
                    count: backups.len(),
                };
                println!("{}", serde_json::to_string(&output)?);
            } else if backups.is_empty() {
                println!("No backups yet.");
            } else {
                for backup in &backups {
                    let when = chrono::DateTime::from_timestamp_millis(backup.created_at)
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!(
                        "{}  {:<7} {:>9}  {}",
                        when.dimmed(),
                        backup.trigger.to_string(),
                        format_size(backup.size_bytes),
                        backup.path.display()
                    );
                    if let Some(reason) = &backup.reason {
                        println!("    {reason}");
                    }
                }
            }
        }
    }
    Ok(())
}
