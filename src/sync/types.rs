//! Sync run reports.
//!
//! A run produces one [`SyncReport`] holding a [`JobReport`] per job that
//! ran. Reports are plain data: the CLI prints them, `--json` serializes
//! them, and nothing reads them back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::model::{BackupSnapshot, BackupTrigger};
use crate::remote::RemoteError;

/// Which jobs a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Push,
    Pull,
    Both,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Both => "both",
        }
    }

    #[must_use]
    pub const fn runs_push(&self) -> bool {
        matches!(self, Self::Push | Self::Both)
    }

    #[must_use]
    pub const fn runs_pull(&self) -> bool {
        matches!(self, Self::Pull | Self::Both)
    }

    /// Backup trigger recorded for this mode.
    #[must_use]
    pub const fn trigger(&self) -> BackupTrigger {
        match self {
            Self::Push => BackupTrigger::Push,
            Self::Pull => BackupTrigger::Pull,
            Self::Both => BackupTrigger::Both,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            "both" | "sync" => Ok(Self::Both),
            other => Err(Error::InvalidArgument(format!(
                "unknown sync mode '{other}' (expected push, pull or both)"
            ))),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Completed,
    Aborted,
}

/// Failure class of an item error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, rate limit, 5xx, network: picked up again next run.
    Transient,
    /// Auth, unknown deck, rejected payload: stops the job.
    Permanent,
    /// Local store problem for this item.
    Local,
}

impl From<&RemoteError> for ErrorKind {
    fn from(err: &RemoteError) -> Self {
        if err.is_transient() {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// One failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    #[must_use]
    pub fn remote(note_id: Option<i64>, card_id: Option<String>, err: &RemoteError) -> Self {
        Self {
            note_id,
            card_id,
            kind: ErrorKind::from(err),
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn local(note_id: Option<i64>, card_id: Option<String>, err: &Error) -> Self {
        Self {
            note_id,
            card_id,
            kind: ErrorKind::Local,
            message: err.to_string(),
        }
    }
}

/// What happened to one item. Unchanged items are only counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Push created a card, or pull created a note.
    Created { note_id: i64, card_id: String },
    /// Pull rewrote a note from its remote card.
    Updated {
        note_id: i64,
        card_id: String,
        /// The note also had un-pushed local edits, now overwritten.
        overwrote_local: bool,
    },
    /// The note changed after it was pushed; the remote cannot be updated.
    LocalChangedNotPushed { note_id: i64, card_id: String },
    /// A linked card is no longer listed in the deck.
    MissingRemote { note_id: i64, card_id: String },
    Failed(ItemError),
}

/// Counts and outcomes for one push or pull pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Items the job considered for a change.
    pub candidates: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub local_changed_not_pushed: usize,
    pub missing_remote: usize,
    pub overwritten_local_changes: usize,
    pub errors: Vec<ItemError>,
    pub outcomes: Vec<ItemOutcome>,
    /// Set when a permanent error stopped the job early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Set when cancellation stopped scheduling new items.
    pub cancelled: bool,
}

impl JobReport {
    /// Count and keep an outcome.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Created { .. } => self.created += 1,
            ItemOutcome::Updated {
                overwrote_local, ..
            } => {
                self.updated += 1;
                if *overwrote_local {
                    self.overwritten_local_changes += 1;
                }
            }
            ItemOutcome::LocalChangedNotPushed { .. } => self.local_changed_not_pushed += 1,
            ItemOutcome::MissingRemote { .. } => self.missing_remote += 1,
            ItemOutcome::Failed(err) => self.errors.push(err.clone()),
        }
        self.outcomes.push(outcome);
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Note ids reported as `local_changed_not_pushed`.
    #[must_use]
    pub fn local_changed_note_ids(&self) -> Vec<i64> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::LocalChangedNotPushed { note_id, .. } => Some(*note_id),
                _ => None,
            })
            .collect()
    }
}

/// Summary counts across all jobs of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub local_changed_not_pushed: usize,
    pub errors: usize,
}

/// The result of one orchestrated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub mode: SyncMode,
    pub deck_id: String,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<JobReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull: Option<JobReport>,
    /// RFC 3339.
    pub started_at: String,
    /// RFC 3339.
    pub finished_at: String,
}

impl SyncReport {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state == RunState::Aborted
    }

    /// Sum the counts of every job that ran.
    #[must_use]
    pub fn totals(&self) -> ReportTotals {
        [self.push.as_ref(), self.pull.as_ref()]
            .into_iter()
            .flatten()
            .fold(ReportTotals::default(), |mut t, job| {
                t.created += job.created;
                t.updated += job.updated;
                t.skipped += job.skipped;
                t.local_changed_not_pushed += job.local_changed_not_pushed;
                t.errors += job.errors.len();
                t
            })
    }
}

/// The result of a repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub run_id: String,
    pub deck_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSnapshot>,
    /// Links examined.
    pub checked: usize,
    /// Links rewritten to a freshly created card.
    pub recreated: usize,
    /// Links whose note no longer exists locally.
    pub missing_local_note: usize,
    pub failed: usize,
    pub errors: Vec<ItemError>,
    /// Set when a permanent error stopped the repair early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub cancelled: bool,
}
