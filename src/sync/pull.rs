//! Pull job: remote cards → local notes.
//!
//! One listing call fetches the deck (page by page); every card is then reconciled on
//! its own. Unmapped cards become new notes (with provenance and link in
//! the same transaction). Mapped cards whose content hash moved rewrite
//! their note in place. Remote wins: if the note had un-pushed edits too,
//! they are overwritten and the run says so.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::hash::{card_hash, note_hash};
use super::orchestrator::CancelFlag;
use super::types::{ItemError, ItemOutcome, JobReport};
use crate::error::{Error, Result};
use crate::model::{ORIGIN_REMOTE_PULL, SyncLink};
use crate::remote::render::parse_card;
use crate::remote::{RemoteCard, RemoteCardService};
use crate::storage::{NewSource, SqliteStorage};

/// Run one pull pass over `deck_id`.
///
/// # Errors
///
/// Returns an error only if the existing links cannot be read. A failed
/// listing is recorded in the report and ends the job.
pub async fn run_pull<R>(
    storage: &mut SqliteStorage,
    remote: &R,
    deck_id: &str,
    cancel: &CancelFlag,
    actor: &str,
) -> Result<JobReport>
where
    R: RemoteCardService,
{
    let mut report = JobReport::default();

    if cancel.is_cancelled() {
        report.cancelled = true;
        return Ok(report);
    }

    // Timeouts apply per page inside the client, not to the whole listing.
    let cards = match remote.list_cards(deck_id).await {
        Ok(cards) => cards,
        Err(e) => {
            warn!(deck_id, error = %e, "could not list remote cards");
            report.aborted = Some(format!("listing deck failed: {e}"));
            report.record(ItemOutcome::Failed(ItemError::remote(None, None, &e)));
            return Ok(report);
        }
    };

    let mut links: HashMap<String, SyncLink> = storage
        .read_sync_links()?
        .into_iter()
        .map(|l| (l.card_id.clone(), l))
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    for card in &cards {
        if !seen.insert(card.id.clone()) {
            continue;
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        report.candidates += 1;

        let outcome = reconcile_card(storage, card, links.get(&card.id), deck_id, actor);
        match outcome {
            Ok(Some((outcome, link))) => {
                links.insert(link.card_id.clone(), link);
                report.record(outcome);
            }
            Ok(None) => report.record_skip(),
            Err(e) => {
                warn!(card_id = %card.id, error = %e, "could not apply remote card");
                let note_id = links.get(&card.id).map(|l| l.note_id);
                report.record(ItemOutcome::Failed(ItemError::local(
                    note_id,
                    Some(card.id.clone()),
                    &e,
                )));
            }
        }
    }

    if !report.cancelled {
        let mut missing: Vec<&SyncLink> = links
            .values()
            .filter(|l| l.deck_id == deck_id && !seen.contains(&l.card_id))
            .collect();
        missing.sort_by_key(|l| l.note_id);
        for link in missing {
            debug!(note_id = link.note_id, card_id = %link.card_id, "linked card missing remotely");
            report.record(ItemOutcome::MissingRemote {
                note_id: link.note_id,
                card_id: link.card_id.clone(),
            });
        }
    }

    info!(
        candidates = report.candidates,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        missing_remote = report.missing_remote,
        errors = report.errors.len(),
        "pull finished"
    );
    Ok(report)
}

/// Apply one remote card. `Ok(None)` means nothing changed.
fn reconcile_card(
    storage: &mut SqliteStorage,
    card: &RemoteCard,
    link: Option<&SyncLink>,
    deck_id: &str,
    actor: &str,
) -> Result<Option<(ItemOutcome, SyncLink)>> {
    let remote_hash = card_hash(card);

    let Some(link) = link else {
        let fields = parse_card(card);
        let template = SyncLink::new(0, &card.id, deck_id, note_hash(&fields), remote_hash)
            .with_remote_updated_at(card.updated_at.clone());
        let source = NewSource {
            source_type: ORIGIN_REMOTE_PULL.to_string(),
            label: Some(
                card.name
                    .clone()
                    .unwrap_or_else(|| format!("mochi:{}", card.id)),
            ),
            url: Some(format!("mochi://card/{}", card.id)),
        };
        let (note, link) = storage.create_linked_note(&fields, &source, &template, actor)?;
        debug!(note_id = note.id, card_id = %card.id, "created note from remote card");
        return Ok(Some((
            ItemOutcome::Created {
                note_id: note.id,
                card_id: card.id.clone(),
            },
            link,
        )));
    };

    if link.remote_hash == remote_hash {
        return Ok(None);
    }

    let note = storage
        .get_note(link.note_id)?
        .ok_or(Error::NoteNotFound { id: link.note_id })?;
    let overwrote_local = note_hash(&note.fields) != link.local_hash;

    let fields = parse_card(card);
    let next = SyncLink {
        local_hash: note_hash(&fields),
        remote_hash,
        remote_updated_at: card.updated_at.clone(),
        last_synced_at: chrono::Utc::now().timestamp_millis(),
        ..link.clone()
    };
    storage.update_note_with_link(&fields, ORIGIN_REMOTE_PULL, &next, actor)?;

    if overwrote_local {
        warn!(
            note_id = note.id,
            card_id = %card.id,
            "remote change overwrote un-pushed local edits"
        );
    } else {
        debug!(note_id = note.id, card_id = %card.id, "updated note from remote card");
    }

    Ok(Some((
        ItemOutcome::Updated {
            note_id: note.id,
            card_id: card.id.clone(),
            overwrote_local,
        },
        next,
    )))
}
