//! cardsync - two-way sync between local flashcards and a Mochi deck
//!
//! This crate provides the core functionality for the `cardsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Note, SyncLink, BackupSnapshot)
//! - [`storage`] - SQLite database layer
//! - [`remote`] - Remote card service (Mochi HTTP client)
//! - [`sync`] - Push / pull / repair engine, backups, locking
//! - [`config`] - Paths, remote settings and engine tuning
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
