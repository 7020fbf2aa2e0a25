//! Repair: rebuild remote cards from local notes.
//!
//! The remote cannot edit a card, so the only way to publish a local edit
//! is to delete the linked card and create a new one from the note. This
//! is destructive on the remote side and never runs as part of push or
//! pull; it needs [`RemoteCardMaintenance`], which those jobs cannot see.
//!
//! Each link in the deck is handled on its own, in order:
//! delete old card → create new card → rewrite the link. A link whose note
//! is gone is counted and left alone.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::hash::{card_hash, note_hash};
use super::orchestrator::SyncEngine;
use super::types::{ItemError, RepairReport};
use crate::error::Result;
use crate::model::{BackupTrigger, SyncLink};
use crate::remote::render::render_note;
use crate::remote::{RemoteCardMaintenance, RemoteError};
use crate::storage::SqliteStorage;

/// Which links a repair rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepairScope {
    /// Every link in the deck.
    #[default]
    All,
    /// Only links whose note changed since it was last pushed.
    ChangedOnly,
}

impl<R> SyncEngine<R>
where
    R: RemoteCardMaintenance + 'static,
{
    /// Recreate remote cards for the links in this engine's deck.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if the deck lock is held, `BackupFailed`
    /// if the pre-repair snapshot cannot be written (nothing is touched in
    /// that case), or a database error if the links cannot be read.
    pub async fn repair(
        &self,
        storage: &mut SqliteStorage,
        scope: RepairScope,
    ) -> Result<RepairReport> {
        let (_lock, run_id, actor) = self.begin()?;
        info!(run_id, deck_id = %self.deck_id, ?scope, "repair started");

        let backup = self
            .backups
            .snapshot(storage, BackupTrigger::Repair, Some("repair"), &actor)?;

        let mut report = RepairReport {
            run_id,
            deck_id: self.deck_id.clone(),
            backup: Some(backup),
            ..RepairReport::default()
        };

        for link in storage.read_sync_links_for_deck(&self.deck_id)? {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let Some(note) = storage.get_note(link.note_id)? else {
                report.checked += 1;
                report.missing_local_note += 1;
                warn!(note_id = link.note_id, card_id = %link.card_id, "link points at a missing note");
                continue;
            };

            let local_hash = note_hash(&note.fields);
            if scope == RepairScope::ChangedOnly && local_hash == link.local_hash {
                continue;
            }
            report.checked += 1;

            match self.recreate(&link, &note.fields).await {
                Ok(mut card) => {
                    if card.deck_id.is_empty() {
                        card.deck_id.clone_from(&self.deck_id);
                    }
                    let fresh = SyncLink::new(
                        note.id,
                        &card.id,
                        &self.deck_id,
                        local_hash,
                        card_hash(&card),
                    )
                    .with_remote_updated_at(card.updated_at.clone());
                    match storage.write_sync_link(&fresh, &actor) {
                        Ok(()) => {
                            debug!(note_id = note.id, old = %link.card_id, new = %card.id, "card recreated");
                            report.recreated += 1;
                        }
                        Err(e) => {
                            warn!(note_id = note.id, card_id = %card.id, error = %e, "card recreated but link not saved");
                            report.failed += 1;
                            report
                                .errors
                                .push(ItemError::local(Some(note.id), Some(card.id), &e));
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(ItemError::remote(
                        Some(note.id),
                        Some(link.card_id.clone()),
                        &e,
                    ));
                    if e.is_transient() {
                        warn!(note_id = note.id, error = %e, "transient remote error during repair");
                    } else {
                        warn!(note_id = note.id, error = %e, "permanent remote error, stopping repair");
                        report.aborted = Some(format!("permanent remote error: {e}"));
                        break;
                    }
                }
            }
        }

        info!(
            run_id = %report.run_id,
            checked = report.checked,
            recreated = report.recreated,
            missing_local_note = report.missing_local_note,
            failed = report.failed,
            finished_at = %Utc::now().to_rfc3339(),
            "repair finished"
        );
        Ok(report)
    }

    /// Delete the linked card (already gone is fine) and create its replacement.
    async fn recreate(
        &self,
        link: &SyncLink,
        fields: &crate::model::NoteFields,
    ) -> std::result::Result<crate::remote::RemoteCard, RemoteError> {
        let timeout = self.options.timeout;

        let deleted = tokio::time::timeout(timeout, self.remote.delete_card(&link.card_id))
            .await
            .unwrap_or(Err(RemoteError::Timeout))?;
        if !deleted {
            debug!(card_id = %link.card_id, "old card already gone");
        }

        let content = render_note(fields);
        tokio::time::timeout(timeout, self.remote.create_card(&self.deck_id, &content))
            .await
            .unwrap_or(Err(RemoteError::Timeout))
    }
}
