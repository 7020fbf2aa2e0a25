//! Remote card service.
//!
//! The sync engine only ever talks to the remote through
//! [`RemoteCardService`], which deliberately has no update operation:
//! the upstream API can create and read cards but not edit them. The
//! push job turns that missing capability into its own outcome
//! (`local_changed_not_pushed`) instead of an error.
//!
//! Destructive calls needed by the repair command live on the separate
//! [`RemoteCardMaintenance`] trait so push/pull can never reach them.
//!
//! # Implementations
//!
//! - [`mochi::MochiClient`] - HTTPS client for the Mochi cards API
//! - `memory::InMemoryCardService` - in-process fake with failure injection (tests only)

#[cfg(test)]
pub mod memory;
pub mod mochi;
pub mod render;
pub mod retry;

use serde::{Deserialize, Serialize};
use std::future::Future;

#[cfg(test)]
pub use memory::InMemoryCardService;
pub use mochi::{MochiClient, RemoteDeck};
pub use retry::RetryPolicy;

/// A card as seen on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCard {
    /// Remote-assigned identifier.
    pub id: String,
    pub deck_id: String,
    /// Template-rendered markdown body.
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Version marker, when the remote exposes one.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Payload for creating a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardContent {
    pub content: String,
    pub tags: Vec<String>,
}

/// Errors from the remote service, split by whether a later run can
/// succeed without operator action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited by remote service")]
    RateLimited,

    #[error("remote service unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication rejected")]
    Unauthorized,

    #[error("deck not found: {0}")]
    DeckNotFound(String),

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Transient errors (timeouts, rate limits, 5xx, network) are left
    /// for the next run. Everything else is permanent for this run.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Unavailable { .. } | Self::Connection(_)
        )
    }

    /// Short machine-readable kind for reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        if self.is_transient() {
            "transient"
        } else {
            "permanent"
        }
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Read/create access to remote cards.
///
/// There is intentionally no `update_card`.
pub trait RemoteCardService: Send + Sync {
    /// All cards currently visible in a deck.
    fn list_cards(&self, deck_id: &str)
    -> impl Future<Output = RemoteResult<Vec<RemoteCard>>> + Send;

    /// Create a card in a deck and return it as stored remotely.
    fn create_card(
        &self,
        deck_id: &str,
        content: &CardContent,
    ) -> impl Future<Output = RemoteResult<RemoteCard>> + Send;
}

/// Destructive operations reserved for explicit maintenance commands.
pub trait RemoteCardMaintenance: RemoteCardService {
    /// Delete a card. Returns `false` when it was already gone.
    fn delete_card(&self, card_id: &str) -> impl Future<Output = RemoteResult<bool>> + Send;
}
