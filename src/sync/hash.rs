//! Content hashing for change detection.
//!
//! Notes and remote cards are fingerprinted with SHA-256 over canonical
//! JSON (object keys sorted). The two digests are only ever compared with
//! their own previous value, never with each other: the remote renders
//! content differently from the stored note.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::model::NoteFields;
use crate::remote::RemoteCard;
use crate::validate::normalize_tags;

/// Compute a SHA-256 hash of a JSON value.
///
/// `serde_json::Value` objects keep their keys sorted, so the encoding
/// does not depend on field order.
#[must_use]
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a note's semantic content.
#[must_use]
pub fn note_hash(fields: &NoteFields) -> String {
    content_hash(&json!({
        "type": fields.note_type.as_str(),
        "front": fields.front,
        "back": fields.back,
        "cloze": fields.cloze,
        "extra": fields.extra,
        "tags": normalize_tags(&fields.tags),
    }))
}

/// Fingerprint of a remote card's content.
#[must_use]
pub fn card_hash(card: &RemoteCard) -> String {
    content_hash(&json!({
        "content": card.content,
        "deck-id": card.deck_id,
        "tags": normalize_tags(&card.tags),
    }))
}
