//! Sync link model.
//!
//! A `SyncLink` is the durable 1:1 pairing between a local note and a
//! remote card, plus the content hash each side had at the last
//! successful push (local) or pull (remote).

use serde::{Deserialize, Serialize};

/// Reconciliation record between a note and a remote card.
///
/// At most one link exists per `note_id` and per `card_id`; the
/// `sync_links` table enforces both with UNIQUE constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLink {
    pub note_id: i64,
    pub card_id: String,
    pub deck_id: String,
    /// Hash of the note content at the last successful push (or the
    /// last pull that rewrote the note).
    pub local_hash: String,
    /// Hash of the remote card content at the last successful pull (or
    /// the push that created it).
    pub remote_hash: String,
    /// Remote version marker, when the service exposes one.
    pub remote_updated_at: Option<String>,
    /// Unix milliseconds.
    pub last_synced_at: i64,
}

impl SyncLink {
    /// Build a link stamped with the current time.
    pub fn new(
        note_id: i64,
        card_id: impl Into<String>,
        deck_id: impl Into<String>,
        local_hash: impl Into<String>,
        remote_hash: impl Into<String>,
    ) -> Self {
        Self {
            note_id,
            card_id: card_id.into(),
            deck_id: deck_id.into(),
            local_hash: local_hash.into(),
            remote_hash: remote_hash.into(),
            remote_updated_at: None,
            last_synced_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn with_remote_updated_at(mut self, updated_at: Option<String>) -> Self {
        self.remote_updated_at = updated_at;
        self
    }
}
