//! SQLite storage layer for cardsync.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic per-item writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Note store, sync links and backup records

pub mod events;
pub mod schema;
pub mod sqlite;

pub use sqlite::{MutationContext, NewSource, Source, SqliteStorage};
