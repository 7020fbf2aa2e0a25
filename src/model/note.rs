//! Note model.
//!
//! A note is the local, authoritative flashcard record. Its identity
//! (`id`, `source_id`, `created_at`) never changes; only the content
//! captured by [`NoteFields`] is mutable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::validate::{has_cloze_marker, normalize_note_type, normalize_tags};

/// Origin of a note authored on this machine.
pub const ORIGIN_MANUAL: &str = "manual";

/// Origin of a note created or last rewritten by a pull.
pub const ORIGIN_REMOTE_PULL: &str = "remote_pull";

/// Kind of flashcard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    /// Front / back question card.
    #[default]
    Basic,
    /// Cloze deletion card (`{{c1::...}}`).
    Cloze,
}

impl NoteType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Cloze => "cloze",
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_note_type(s).as_deref() {
            Ok("basic") => Ok(Self::Basic),
            Ok("cloze") => Ok(Self::Cloze),
            Ok(other) => Err(Error::InvalidNoteType(other.to_string())),
            Err((input, Some(suggestion))) => Err(Error::InvalidNoteType(format!(
                "{input} (did you mean: {suggestion}?)"
            ))),
            Err((input, None)) => Err(Error::InvalidNoteType(input.clone())),
        }
    }
}

/// The mutable, semantic content of a note.
///
/// This is what gets hashed for change detection, what gets rendered
/// into remote card content, and what a pull overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    #[serde(rename = "type")]
    pub note_type: NoteType,
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
    #[serde(default)]
    pub cloze: String,
    #[serde(default)]
    pub extra: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NoteFields {
    /// Build a basic front/back note.
    pub fn basic(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            note_type: NoteType::Basic,
            front: front.into(),
            back: back.into(),
            ..Self::default()
        }
    }

    /// Build a cloze note.
    pub fn cloze(text: impl Into<String>) -> Self {
        Self {
            note_type: NoteType::Cloze,
            cloze: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }

    #[must_use]
    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.tags = normalize_tags(tags);
        self
    }

    /// Check that the fields required by the note type are present.
    ///
    /// # Errors
    ///
    /// Returns `RequiredField` for an empty front (basic) or cloze body,
    /// and `InvalidArgument` for a cloze body without any deletion marker.
    pub fn validate(&self) -> crate::Result<()> {
        match self.note_type {
            NoteType::Basic => {
                if self.front.trim().is_empty() {
                    return Err(Error::RequiredField("front".to_string()));
                }
            }
            NoteType::Cloze => {
                if self.cloze.trim().is_empty() {
                    return Err(Error::RequiredField("cloze".to_string()));
                }
                if !has_cloze_marker(&self.cloze) {
                    return Err(Error::InvalidArgument(
                        "cloze text needs at least one {{c1::...}} deletion".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Short single-line label for listings and logs.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let source = match self.note_type {
            NoteType::Basic => &self.front,
            NoteType::Cloze => &self.cloze,
        };
        let line = source.lines().next().unwrap_or_default().trim();
        if line.chars().count() <= max_chars {
            line.to_string()
        } else {
            let cut: String = line.chars().take(max_chars.saturating_sub(1)).collect();
            format!("{cut}…")
        }
    }
}

/// A stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    #[serde(flatten)]
    pub fields: NoteFields,
    /// Provenance row in `sources` (0 = authored locally).
    pub source_id: i64,
    /// Which path last wrote the content (`manual`, `remote_pull`, ...).
    pub origin: String,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// Filter for `SqliteStorage::list_notes`.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub note_type: Option<NoteType>,
    pub tag: Option<String>,
    pub origin: Option<String>,
    pub limit: Option<u32>,
}
