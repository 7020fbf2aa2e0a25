//! Error types for cardsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias for cardsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    NoteNotFound,
    LinkNotFound,

    // Validation (exit 4)
    InvalidType,
    InvalidArgument,
    RequiredField,

    // Sync (exit 6)
    SyncInProgress,
    SyncAborted,
    BackupFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote (exit 9)
    RemoteTransient,
    RemotePermanent,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NoteNotFound => "NOTE_NOT_FOUND",
            Self::LinkNotFound => "LINK_NOT_FOUND",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::SyncAborted => "SYNC_ABORTED",
            Self::BackupFailed => "BACKUP_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RemoteTransient => "REMOTE_TRANSIENT",
            Self::RemotePermanent => "REMOTE_PERMANENT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::NoteNotFound | Self::LinkNotFound => 3,
            Self::InvalidType | Self::InvalidArgument | Self::RequiredField => 4,
            Self::SyncInProgress | Self::SyncAborted | Self::BackupFailed => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::RemoteTransient | Self::RemotePermanent => 9,
        }
    }

    /// Whether re-running the same command later can succeed.
    ///
    /// True for lock contention, busy databases and transient remote
    /// failures. Sync runs are idempotent, so re-invocation is safe.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SyncInProgress | Self::DatabaseError | Self::RemoteTransient
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in cardsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `cardsync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Note not found: {id}")]
    NoteNotFound { id: i64 },

    #[error("No sync link for note {note_id}")]
    LinkNotFound { note_id: i64 },

    #[error("Invalid note type: {0}")]
    InvalidNoteType(String),

    #[error("Missing required field: {0}")]
    RequiredField(String),

    #[error("Another sync is already running for deck {deck_id}")]
    SyncInProgress { deck_id: String, lock_path: PathBuf },

    #[error("Sync aborted: {reason}")]
    SyncAborted { reason: String },

    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::NoteNotFound { .. } => ErrorCode::NoteNotFound,
            Self::LinkNotFound { .. } => ErrorCode::LinkNotFound,
            Self::InvalidNoteType(_) => ErrorCode::InvalidType,
            Self::RequiredField(_) => ErrorCode::RequiredField,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::SyncInProgress { .. } => ErrorCode::SyncInProgress,
            Self::SyncAborted { .. } => ErrorCode::SyncAborted,
            Self::BackupFailed(_) => ErrorCode::BackupFailed,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Remote(e) => {
                if e.is_transient() {
                    ErrorCode::RemoteTransient
                } else {
                    ErrorCode::RemotePermanent
                }
            }
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `cardsync init` to initialize the database".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::NoteNotFound { id } => Some(format!(
                "No note with ID {id}. Use `cardsync note list` to see stored notes."
            )),

            Self::LinkNotFound { .. } => Some(
                "The note has never been pushed. Run `cardsync sync push` first.".to_string(),
            ),

            Self::InvalidNoteType(_) => Some("Valid note types: basic, cloze".to_string()),

            Self::SyncInProgress { lock_path, .. } => Some(format!(
                "Wait for the running sync to finish. Lock file: {}",
                lock_path.display()
            )),

            Self::BackupFailed(_) => Some(
                "No notes or links were modified. Check CARDSYNC_BACKUP_DIR is writable."
                    .to_string(),
            ),

            Self::Config(msg) if msg.contains("API key") => Some(
                "Set a key with `cardsync config set-key <key>` or the MOCHI_API_KEY env var"
                    .to_string(),
            ),
            Self::Config(msg) if msg.contains("deck") => Some(
                "Pick a deck with `cardsync remote decks` then `cardsync config set-deck <id>`"
                    .to_string(),
            ),

            Self::Remote(e) if e.is_transient() => Some(
                "The remote service is unavailable or rate limiting. Re-run later; sync is idempotent."
                    .to_string(),
            ),

            Self::RequiredField(_)
            | Self::InvalidArgument(_)
            | Self::SyncAborted { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Remote(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
