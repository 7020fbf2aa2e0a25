//! Sync orchestrator.
//!
//! A run is `lock → backup → push? → pull? → completed`. A failed backup
//! ends the run as `aborted` before either job touches the store. Job
//! level problems (item failures, a permanent error stopping one job) are
//! recorded in that job's report and never stop the other job.
//!
//! The engine keeps no state between runs: everything it needs to resume
//! lives in `sync_links`.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{info, warn};

use super::backup::BackupManager;
use super::lock::SyncLock;
use super::pull::run_pull;
use super::push::run_push;
use super::types::{RunState, SyncMode, SyncReport};
use crate::config::SyncOptions;
use crate::error::Result;
use crate::remote::RemoteCardService;
use crate::storage::SqliteStorage;

/// Cooperative cancellation shared between a run and whoever stops it.
///
/// Jobs check it between items: no new remote call is started once it is
/// set, and calls already in flight finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs push / pull against one remote deck.
pub struct SyncEngine<R> {
    pub(super) remote: Arc<R>,
    pub(super) deck_id: String,
    pub(super) backups: BackupManager,
    pub(super) lock_dir: PathBuf,
    pub(super) options: SyncOptions,
    pub(super) cancel: CancelFlag,
}

impl<R> SyncEngine<R> {
    pub fn new(
        remote: Arc<R>,
        deck_id: impl Into<String>,
        backups: BackupManager,
        lock_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote,
            deck_id: deck_id.into(),
            backups,
            lock_dir: lock_dir.into(),
            options: SyncOptions::default(),
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for stopping this engine's runs.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    #[must_use]
    pub fn deck_id(&self) -> &str {
        &self.deck_id
    }

    /// Take the deck lock and build the run identity.
    pub(super) fn begin(&self) -> Result<(SyncLock, String, String)> {
        let lock = SyncLock::acquire(&self.lock_dir, &self.deck_id)?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let actor = format!("sync:{}", &run_id[..12]);
        Ok((lock, run_id, actor))
    }
}

impl<R> SyncEngine<R>
where
    R: RemoteCardService + 'static,
{
    /// Run one sync.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if another run holds the deck lock, or a
    /// database error if the local store cannot be read. A failed backup
    /// is not an error: it yields an `aborted` report.
    pub async fn run(&self, storage: &mut SqliteStorage, mode: SyncMode) -> Result<SyncReport> {
        let (_lock, run_id, actor) = self.begin()?;
        let started_at = Utc::now().to_rfc3339();
        info!(run_id, %mode, deck_id = %self.deck_id, "sync run started");

        let mut report = SyncReport {
            run_id,
            mode,
            deck_id: self.deck_id.clone(),
            state: RunState::Completed,
            abort_reason: None,
            backup: None,
            push: None,
            pull: None,
            started_at,
            finished_at: String::new(),
        };

        match self.backups.snapshot(storage, mode.trigger(), None, &actor) {
            Ok(snapshot) => report.backup = Some(snapshot),
            Err(e) => {
                warn!(run_id = %report.run_id, error = %e, "backup failed, sync aborted");
                report.state = RunState::Aborted;
                report.abort_reason = Some(e.to_string());
                report.finished_at = Utc::now().to_rfc3339();
                return Ok(report);
            }
        }

        if mode.runs_push() {
            let push = run_push(
                storage,
                &self.remote,
                &self.deck_id,
                &self.options,
                &self.cancel,
                &actor,
            )
            .await?;
            report.push = Some(push);
        }

        if mode.runs_pull() {
            let pull = run_pull(
                storage,
                self.remote.as_ref(),
                &self.deck_id,
                &self.cancel,
                &actor,
            )
            .await?;
            report.pull = Some(pull);
        }

        report.finished_at = Utc::now().to_rfc3339();
        let totals = report.totals();
        info!(
            run_id = %report.run_id,
            created = totals.created,
            updated = totals.updated,
            skipped = totals.skipped,
            local_changed_not_pushed = totals.local_changed_not_pushed,
            errors = totals.errors,
            "sync run completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{NoteFields, NoteFilter};
    use crate::remote::{InMemoryCardService, RemoteError};
    use std::collections::HashSet;
    use tempfile::TempDir;

    const DECK: &str = "deck1";

    struct Fixture {
        _dir: TempDir,
        storage: SqliteStorage,
        remote: Arc<InMemoryCardService>,
        engine: SyncEngine<InMemoryCardService>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(InMemoryCardService::new());
        let engine = SyncEngine::new(
            Arc::clone(&remote),
            DECK,
            BackupManager::new(dir.path().join("backups")),
            dir.path().join("locks"),
        );
        Fixture {
            storage: SqliteStorage::open_memory().unwrap(),
            remote,
            engine,
            _dir: dir,
        }
    }

    fn assert_one_to_one(storage: &SqliteStorage) {
        let links = storage.read_sync_links().unwrap();
        let notes: HashSet<i64> = links.iter().map(|l| l.note_id).collect();
        let cards: HashSet<&str> = links.iter().map(|l| l.card_id.as_str()).collect();
        assert_eq!(notes.len(), links.len());
        assert_eq!(cards.len(), links.len());
    }

    #[tokio::test]
    async fn test_push_then_pull_is_quiet() {
        let mut f = fixture();
        let note = f
            .storage
            .create_note(&NoteFields::basic("A", "a"), "t")
            .unwrap();

        let push = f.engine.run(&mut f.storage, SyncMode::Push).await.unwrap();
        assert_eq!(push.state, RunState::Completed);
        assert_eq!(push.totals().created, 1);
        let link = f.storage.get_link_by_note(note.id).unwrap().unwrap();
        assert!(f.remote.get_card(&link.card_id).is_some());

        let pull = f.engine.run(&mut f.storage, SyncMode::Pull).await.unwrap();
        let totals = pull.totals();
        assert_eq!(totals.created + totals.updated, 0);
        assert_eq!(f.storage.count_notes().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_both_runs_push_then_pull() {
        let mut f = fixture();
        f.storage
            .create_note(&NoteFields::basic("local", "x"), "t")
            .unwrap();
        f.remote.insert_card(DECK, "remote\n---\ny", &[]);

        let report = f.engine.run(&mut f.storage, SyncMode::Both).await.unwrap();
        assert_eq!(report.push.as_ref().unwrap().created, 1);
        assert_eq!(report.pull.as_ref().unwrap().created, 1);
        assert_eq!(report.pull.as_ref().unwrap().skipped, 1);
        assert_eq!(f.storage.count_notes().unwrap(), 2);
        assert_eq!(f.remote.cards_in(DECK).len(), 2);
        assert_one_to_one(&f.storage);

        let again = f.engine.run(&mut f.storage, SyncMode::Both).await.unwrap();
        let totals = again.totals();
        assert_eq!(totals.created + totals.updated, 0);
        assert_eq!(totals.skipped, 4);
        assert_one_to_one(&f.storage);
    }

    #[tokio::test]
    async fn test_each_run_takes_a_backup() {
        let mut f = fixture();
        let report = f.engine.run(&mut f.storage, SyncMode::Pull).await.unwrap();
        let backup = report.backup.unwrap();
        assert!(backup.path.exists());
        assert_eq!(backup.trigger, crate::model::BackupTrigger::Pull);
        assert_eq!(f.storage.list_backups(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let remote = Arc::new(InMemoryCardService::new());
        remote.insert_card(DECK, "remote\n---\ny", &[]);
        let engine = SyncEngine::new(
            Arc::clone(&remote),
            DECK,
            BackupManager::new(blocker.join("backups")),
            dir.path().join("locks"),
        );
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.create_note(&NoteFields::basic("A", "a"), "t").unwrap();
        let notes_before = storage.list_notes(&NoteFilter::default()).unwrap();

        let report = engine.run(&mut storage, SyncMode::Both).await.unwrap();
        assert!(report.is_aborted());
        assert!(report.abort_reason.is_some());
        assert!(report.push.is_none() && report.pull.is_none());
        assert_eq!(remote.create_calls(), 0);
        assert_eq!(remote.list_calls(), 0);
        assert_eq!(storage.list_notes(&NoteFilter::default()).unwrap(), notes_before);
        assert!(storage.read_sync_links().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let mut f = fixture();
        let _held = SyncLock::acquire(&f.engine.lock_dir, DECK).unwrap();

        let err = f.engine.run(&mut f.storage, SyncMode::Push).await.unwrap_err();
        assert!(matches!(err, Error::SyncInProgress { .. }));
        assert!(f.storage.list_backups(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_push_error_still_runs_pull() {
        let mut f = fixture();
        f.storage
            .create_note(&NoteFields::basic("A", "a"), "t")
            .unwrap();
        f.remote.insert_card(DECK, "remote\n---\ny", &[]);
        f.remote.fail_next_create(RemoteError::DeckNotFound(DECK.into()));

        let report = f.engine.run(&mut f.storage, SyncMode::Both).await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert!(report.push.as_ref().unwrap().aborted.is_some());
        assert_eq!(report.pull.as_ref().unwrap().created, 1);
        assert_eq!(report.totals().errors, 1);
    }

    #[tokio::test]
    async fn test_cancelled_engine_does_not_touch_remote() {
        let mut f = fixture();
        f.storage
            .create_note(&NoteFields::basic("A", "a"), "t")
            .unwrap();
        f.engine.cancel_flag().cancel();

        let report = f.engine.run(&mut f.storage, SyncMode::Both).await.unwrap();
        assert!(report.push.as_ref().unwrap().cancelled);
        assert!(report.pull.as_ref().unwrap().cancelled);
        assert_eq!(f.remote.create_calls(), 0);
        assert_eq!(f.remote.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_scenarios_end_to_end() {
        let mut f = fixture();

        // Remote card c2 exists, unmapped: pull creates and links a note.
        let c2 = f.remote.insert_card(DECK, "Capital of France?\n---\nParis", &[]);
        let first = f.engine.run(&mut f.storage, SyncMode::Pull).await.unwrap();
        assert_eq!(first.totals().created, 1);
        let c2_link = f.storage.get_link_by_card(&c2.id).unwrap().unwrap();
        let second = f.engine.run(&mut f.storage, SyncMode::Pull).await.unwrap();
        assert_eq!(second.totals().created + second.totals().updated, 0);

        // Linked note edited locally: push reports it and leaves the card alone.
        f.storage
            .update_note(
                c2_link.note_id,
                &NoteFields::basic("Capital of France?", "Paris (edited)"),
                "t",
            )
            .unwrap();
        let push = f.engine.run(&mut f.storage, SyncMode::Push).await.unwrap();
        assert_eq!(push.totals().local_changed_not_pushed, 1);
        assert_eq!(f.remote.get_card(&c2.id).unwrap().content, c2.content);
        assert_eq!(
            f.storage.get_link_by_card(&c2.id).unwrap().unwrap().local_hash,
            c2_link.local_hash
        );

        // Card edited remotely: pull overwrites the note and advances the hash.
        f.remote.edit_card(&c2.id, "Capital of France?\n---\nParis, on the Seine");
        let pull = f.engine.run(&mut f.storage, SyncMode::Pull).await.unwrap();
        assert_eq!(pull.totals().updated, 1);
        let link = f.storage.get_link_by_card(&c2.id).unwrap().unwrap();
        assert_ne!(link.remote_hash, c2_link.remote_hash);
        let note = f.storage.get_note(link.note_id).unwrap().unwrap();
        assert_eq!(note.fields.back, "Paris, on the Seine");
        assert_one_to_one(&f.storage);
    }
}
