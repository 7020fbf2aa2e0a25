//! Two-way sync between local notes and a remote card deck.
//!
//! - **Push**: unlinked notes → new remote cards (the remote cannot update)
//! - **Pull**: remote cards → new or rewritten local notes (remote wins)
//! - **Repair**: delete and recreate linked cards from local notes
//! - **Hashing**: canonical SHA-256 content hashes for change detection
//!
//! # Architecture
//!
//! Every run goes through [`SyncEngine`], which takes a per-deck file
//! lock, snapshots the store via [`BackupManager`], then runs the jobs.
//! The only state carried between runs is the `sync_links` table: one
//! row per note/card pair with the hash each side had when last synced.
//!
//! # Example
//!
//! ```ignore
//! use cardsync::sync::{BackupManager, SyncEngine, SyncMode};
//!
//! let engine = SyncEngine::new(remote, deck_id, BackupManager::new(backup_dir), lock_dir);
//! let report = engine.run(&mut storage, SyncMode::Both).await?;
//! println!("{} created", report.totals().created);
//! ```

mod backup;
mod hash;
mod lock;
mod orchestrator;
mod pull;
mod push;
mod repair;
mod status;
mod types;

pub use backup::BackupManager;
pub use hash::{card_hash, content_hash, note_hash};
pub use lock::{LockHolder, SyncLock};
pub use orchestrator::{CancelFlag, SyncEngine};
pub use pull::run_pull;
pub use push::run_push;
pub use repair::RepairScope;
pub use status::{format_size, get_sync_status, print_status, SyncStatus};
pub use types::{
    ErrorKind, ItemError, ItemOutcome, JobReport, RepairReport, ReportTotals, RunState, SyncMode,
    SyncReport,
};
