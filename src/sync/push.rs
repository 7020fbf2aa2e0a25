//! Push job: local notes → remote cards.
//!
//! Unlinked notes get a remote card and a new link. Linked notes whose
//! content changed since the last push cannot be sent (the remote has no
//! update call), so they are reported as `local_changed_not_pushed` and
//! their link is left untouched; the same report repeats on every push
//! until a repair recreates the card.
//!
//! Creates run concurrently on a `JoinSet`, at most `concurrency` at a
//! time. Results are drained here, on the calling task, which is the
//! only writer of `sync_links` during the job.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::hash::{card_hash, note_hash};
use super::orchestrator::CancelFlag;
use super::types::{ItemError, ItemOutcome, JobReport};
use crate::config::SyncOptions;
use crate::error::Result;
use crate::model::{Note, NoteFilter, SyncLink};
use crate::remote::render::render_note;
use crate::remote::{RemoteCard, RemoteCardService, RemoteError, RemoteResult};
use crate::storage::SqliteStorage;

/// Run one push pass against `deck_id`.
///
/// # Errors
///
/// Returns an error only if the candidate set cannot be read. Per-item
/// failures are recorded in the report.
pub async fn run_push<R>(
    storage: &mut SqliteStorage,
    remote: &Arc<R>,
    deck_id: &str,
    options: &SyncOptions,
    cancel: &CancelFlag,
    actor: &str,
) -> Result<JobReport>
where
    R: RemoteCardService + 'static,
{
    let mut report = JobReport::default();

    let notes = storage.list_notes(&NoteFilter::default())?;
    let links: HashMap<i64, SyncLink> = storage
        .read_sync_links()?
        .into_iter()
        .map(|l| (l.note_id, l))
        .collect();

    let mut to_create: Vec<(Note, String)> = Vec::new();
    for note in notes {
        let hash = note_hash(&note.fields);
        match links.get(&note.id) {
            None => to_create.push((note, hash)),
            Some(link) if link.local_hash != hash => {
                report.candidates += 1;
                info!(
                    note_id = note.id,
                    card_id = %link.card_id,
                    "local change cannot be pushed (remote has no update)"
                );
                report.record(ItemOutcome::LocalChangedNotPushed {
                    note_id: note.id,
                    card_id: link.card_id.clone(),
                });
            }
            Some(_) => report.record_skip(),
        }
    }
    report.candidates += to_create.len();

    let concurrency = options.concurrency.max(1);
    let mut queue = to_create.into_iter();
    let mut in_flight: JoinSet<(i64, String, RemoteResult<RemoteCard>)> = JoinSet::new();

    loop {
        while report.aborted.is_none() && in_flight.len() < concurrency {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some((note, hash)) = queue.next() else {
                break;
            };

            let remote = Arc::clone(remote);
            let deck = deck_id.to_string();
            let content = render_note(&note.fields);
            let timeout = options.timeout;
            debug!(note_id = note.id, "creating remote card");

            in_flight.spawn(async move {
                let result = tokio::time::timeout(timeout, remote.create_card(&deck, &content))
                    .await
                    .unwrap_or(Err(RemoteError::Timeout));
                (note.id, hash, result)
            });
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };

        match joined {
            Ok((note_id, local_hash, Ok(mut card))) => {
                if card.deck_id.is_empty() {
                    card.deck_id = deck_id.to_string();
                }
                let link = SyncLink::new(note_id, &card.id, deck_id, local_hash, card_hash(&card))
                    .with_remote_updated_at(card.updated_at.clone());
                match storage.write_sync_link(&link, actor) {
                    Ok(()) => {
                        debug!(note_id, card_id = %card.id, "pushed note");
                        report.record(ItemOutcome::Created {
                            note_id,
                            card_id: card.id,
                        });
                    }
                    Err(e) => {
                        warn!(note_id, card_id = %card.id, error = %e, "card created but link not saved");
                        report.record(ItemOutcome::Failed(ItemError::local(
                            Some(note_id),
                            Some(card.id),
                            &e,
                        )));
                    }
                }
            }
            Ok((note_id, _, Err(e))) => {
                if e.is_transient() {
                    warn!(note_id, error = %e, "transient remote error, will retry next run");
                } else if report.aborted.is_none() {
                    warn!(note_id, error = %e, "permanent remote error, stopping push");
                    report.aborted = Some(format!("permanent remote error: {e}"));
                }
                report.record(ItemOutcome::Failed(ItemError::remote(Some(note_id), None, &e)));
            }
            Err(join_err) => {
                warn!(error = %join_err, "push task failed");
                report.record(ItemOutcome::Failed(ItemError::local(
                    None,
                    None,
                    &crate::error::Error::Other(join_err.to_string()),
                )));
            }
        }
    }

    let not_attempted = queue.len();
    if not_attempted > 0 {
        info!(not_attempted, "push stopped before scheduling every note");
    }

    info!(
        candidates = report.candidates,
        created = report.created,
        skipped = report.skipped,
        local_changed_not_pushed = report.local_changed_not_pushed,
        errors = report.errors.len(),
        "push finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteFields;
    use crate::remote::InMemoryCardService;
    use std::time::Duration;

    const DECK: &str = "deck1";

    fn options() -> SyncOptions {
        SyncOptions {
            concurrency: 2,
            timeout: Duration::from_secs(5),
            ..SyncOptions::default()
        }
    }

    fn add(storage: &mut SqliteStorage, front: &str) -> Note {
        storage
            .create_note(&NoteFields::basic(front, "answer"), "test")
            .unwrap()
    }

    async fn push(storage: &mut SqliteStorage, remote: &Arc<InMemoryCardService>) -> JobReport {
        run_push(storage, remote, DECK, &options(), &CancelFlag::new(), "test")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_push_creates_and_links() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        let note = add(&mut storage, "Q1");

        let report = push(&mut storage, &remote).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.candidates, 1);

        let link = storage.get_link_by_note(note.id).unwrap().unwrap();
        assert_eq!(link.local_hash, note_hash(&note.fields));
        let card = remote.get_card(&link.card_id).unwrap();
        assert_eq!(card.deck_id, DECK);
        assert_eq!(link.remote_hash, card_hash(&card));
    }

    #[tokio::test]
    async fn test_second_push_is_a_no_op() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        add(&mut storage, "Q1");
        add(&mut storage, "Q2");

        push(&mut storage, &remote).await;
        let calls = remote.create_calls();
        let second = push(&mut storage, &remote).await;

        assert_eq!(remote.create_calls(), calls);
        assert_eq!(second.created, 0);
        assert_eq!(second.candidates, 0);
        assert_eq!(second.skipped, 2);
    }

    #[tokio::test]
    async fn test_local_edit_is_reported_every_time() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        let note = add(&mut storage, "Q1");
        push(&mut storage, &remote).await;
        let link = storage.get_link_by_note(note.id).unwrap().unwrap();
        let card_before = remote.get_card(&link.card_id).unwrap();

        storage
            .update_note(note.id, &NoteFields::basic("Q1 edited", "answer"), "test")
            .unwrap();

        for _ in 0..2 {
            let report = push(&mut storage, &remote).await;
            assert_eq!(report.local_changed_not_pushed, 1);
            assert_eq!(report.local_changed_note_ids(), vec![note.id]);
            assert_eq!(report.created, 0);
        }

        assert_eq!(storage.get_link_by_note(note.id).unwrap().unwrap(), link);
        assert_eq!(remote.get_card(&link.card_id).unwrap(), card_before);
        assert_eq!(remote.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_leaves_note_unlinked() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        let ok = add(&mut storage, "fine");
        let flaky = add(&mut storage, "flaky");
        remote.fail_creates_containing("flaky", RemoteError::RateLimited);

        let report = push(&mut storage, &remote).await;
        assert_eq!(report.created, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].note_id, Some(flaky.id));
        assert!(report.aborted.is_none());
        assert!(storage.get_link_by_note(ok.id).unwrap().is_some());
        assert!(storage.get_link_by_note(flaky.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_scheduling() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        for i in 0..5 {
            add(&mut storage, &format!("Q{i}"));
        }
        remote.fail_next_create(RemoteError::Unauthorized);

        let opts = SyncOptions {
            concurrency: 1,
            ..options()
        };
        let report = run_push(&mut storage, &remote, DECK, &opts, &CancelFlag::new(), "t")
            .await
            .unwrap();

        assert!(report.aborted.is_some());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(remote.create_calls(), 1);
        assert!(storage.read_sync_links().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_a_transient_item_failure() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new().with_create_delay(Duration::from_millis(300)));
        add(&mut storage, "slow");

        let opts = SyncOptions {
            timeout: Duration::from_millis(20),
            ..options()
        };
        let report = run_push(&mut storage, &remote, DECK, &opts, &CancelFlag::new(), "t")
            .await
            .unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, crate::sync::types::ErrorKind::Transient);
        assert!(report.aborted.is_none());
        assert!(storage.read_sync_links().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new().with_create_delay(Duration::from_millis(20)));
        for i in 0..8 {
            add(&mut storage, &format!("Q{i}"));
        }

        let opts = SyncOptions {
            concurrency: 3,
            ..options()
        };
        let report = run_push(&mut storage, &remote, DECK, &opts, &CancelFlag::new(), "t")
            .await
            .unwrap();

        assert_eq!(report.created, 8);
        assert!(remote.max_in_flight() <= 3);
        assert!(remote.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_cancel_before_start_schedules_nothing() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        add(&mut storage, "Q");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = run_push(&mut storage, &remote, DECK, &options(), &cancel, "t")
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(remote.create_calls(), 0);
        assert_eq!(report.created, 0);
    }
}
