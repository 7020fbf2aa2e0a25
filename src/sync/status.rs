//! Local sync status.
//!
//! Computed from the local store alone: no remote call is made, so the
//! counts say what the next push would do, not what the remote holds.

use std::collections::HashMap;

use colored::Colorize;
use serde::Serialize;

use super::hash::note_hash;
use crate::error::Result;
use crate::model::{BackupSnapshot, NoteFilter};
use crate::storage::SqliteStorage;

/// Snapshot of local sync state for one deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<String>,
    pub total_notes: usize,
    pub linked_notes: usize,
    /// Notes a push would create cards for.
    pub unlinked_notes: usize,
    /// Linked notes edited since their last push.
    pub changed_since_push: usize,
    /// Links pointing at the configured deck.
    pub links_in_deck: usize,
    /// Links whose note no longer exists.
    pub orphan_links: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<BackupSnapshot>,
}

/// Compute the local status, scoped to `deck_id` when one is configured.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn get_sync_status(storage: &SqliteStorage, deck_id: Option<&str>) -> Result<SyncStatus> {
    let notes = storage.list_notes(&NoteFilter::default())?;
    let links: HashMap<i64, _> = storage
        .read_sync_links()?
        .into_iter()
        .map(|l| (l.note_id, l))
        .collect();

    let mut linked_notes = 0;
    let mut changed_since_push = 0;
    for note in &notes {
        if let Some(link) = links.get(&note.id) {
            linked_notes += 1;
            if link.local_hash != note_hash(&note.fields) {
                changed_since_push += 1;
            }
        }
    }

    let note_ids: std::collections::HashSet<i64> = notes.iter().map(|n| n.id).collect();
    let orphan_links = links.keys().filter(|id| !note_ids.contains(id)).count();
    let links_in_deck = match deck_id {
        Some(deck) => links.values().filter(|l| l.deck_id == deck).count(),
        None => links.len(),
    };

    Ok(SyncStatus {
        deck_id: deck_id.map(str::to_string),
        total_notes: notes.len(),
        linked_notes,
        unlinked_notes: notes.len() - linked_notes,
        changed_since_push,
        links_in_deck,
        orphan_links,
        last_backup: storage.list_backups(Some(1))?.into_iter().next(),
    })
}

/// Print sync status in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();

    match &status.deck_id {
        Some(deck) => println!("Deck: {}", deck.cyan()),
        None => println!("Deck: {}", "not configured".yellow()),
    }
    println!();

    println!("{}", "Local Notes:".blue().bold());
    println!("  Total:    {}", status.total_notes);
    println!("  Linked:   {}", status.linked_notes);
    println!("  Unlinked: {}", status.unlinked_notes);
    println!("  Links in deck: {}", status.links_in_deck);
    println!();

    if status.unlinked_notes > 0 {
        println!(
            "{}",
            format!("{} note(s) will be created remotely on the next push.", status.unlinked_notes)
                .yellow()
        );
    }
    if status.changed_since_push > 0 {
        println!(
            "{}",
            format!(
                "{} linked note(s) changed locally and cannot be pushed.",
                status.changed_since_push
            )
            .yellow()
        );
        println!(
            "{}",
            "Run 'cardsync sync repair --changed-only' to recreate their cards.".dimmed()
        );
    }
    if status.orphan_links > 0 {
        println!(
            "{}",
            format!("{} link(s) point at deleted notes.", status.orphan_links).red()
        );
    }
    if status.unlinked_notes == 0 && status.changed_since_push == 0 && status.orphan_links == 0 {
        println!("{}", "Nothing pending.".green());
    }
    println!();

    match &status.last_backup {
        Some(backup) => println!(
            "Last backup: {} ({}, {})",
            backup.path.display(),
            backup.trigger,
            format_size(backup.size_bytes)
        ),
        None => println!("{}", "No backups yet.".dimmed()),
    }
}

/// Format a byte size as a human-readable string.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NoteFields, SyncLink};

    #[test]
    fn test_status_counts() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = storage.create_note(&NoteFields::basic("A", "a"), "t").unwrap();
        let b = storage.create_note(&NoteFields::basic("B", "b"), "t").unwrap();
        storage.create_note(&NoteFields::basic("C", "c"), "t").unwrap();

        storage
            .write_sync_link(
                &SyncLink::new(a.id, "c1", "deck1", note_hash(&a.fields), "r1"),
                "t",
            )
            .unwrap();
        storage
            .write_sync_link(&SyncLink::new(b.id, "c2", "deck2", "stale", "r2"), "t")
            .unwrap();
        storage
            .write_sync_link(&SyncLink::new(404, "c3", "deck1", "x", "r3"), "t")
            .unwrap();

        let status = get_sync_status(&storage, Some("deck1")).unwrap();
        assert_eq!(status.total_notes, 3);
        assert_eq!(status.linked_notes, 2);
        assert_eq!(status.unlinked_notes, 1);
        assert_eq!(status.changed_since_push, 1);
        assert_eq!(status.links_in_deck, 2);
        assert_eq!(status.orphan_links, 1);
        assert!(status.last_backup.is_none());

        let unscoped = get_sync_status(&storage, None).unwrap();
        assert_eq!(unscoped.links_in_deck, 3);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
