//! Data models for cardsync.
//!
//! This module contains the local domain models:
//! - Note (and its mutable `NoteFields`)
//! - SyncLink
//! - BackupSnapshot
//!
//! Remote card shapes live in [`crate::remote`].

pub mod backup;
pub mod link;
pub mod note;

pub use backup::{BackupSnapshot, BackupTrigger};
pub use link::SyncLink;
pub use note::{Note, NoteFields, NoteFilter, NoteType, ORIGIN_MANUAL, ORIGIN_REMOTE_PULL};
