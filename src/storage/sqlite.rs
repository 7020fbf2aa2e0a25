//! SQLite storage implementation.
//!
//! This module provides the local note store and sync state for cardsync.
//! It follows the MutationContext pattern for transaction discipline and
//! audit logging: every write is one IMMEDIATE transaction, and a sync
//! item's note + link changes always share that transaction.

use crate::error::{Error, Result};
use crate::model::{
    BackupSnapshot, BackupTrigger, Note, NoteFields, NoteFilter, NoteType, ORIGIN_MANUAL,
    SyncLink,
};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::validate::normalize_tags;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events, which are
/// written in the same transaction as the mutation itself.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (`cli`, `sync:<run id>`, ...).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }
}

/// Provenance of a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: i64,
    pub source_type: String,
    pub label: Option<String>,
    pub url: Option<String>,
    pub created_at: i64,
}

/// Provenance for a note about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSource {
    pub source_type: String,
    pub label: Option<String>,
    pub url: Option<String>,
}

const NOTE_COLUMNS: &str =
    "id, note_type, front, back, cloze, extra, tags, source_id, origin, created_at, updated_at";

const LINK_COLUMNS: &str =
    "note_id, card_id, deck_id, local_hash, remote_hash, remote_updated_at, last_synced_at";

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout_ms.map_or(Duration::from_secs(5), Duration::from_millis))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ===============
    // Note Operations
    // ===============

    /// Create a locally authored note.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing fields, or a database error.
    pub fn create_note(&mut self, fields: &NoteFields, actor: &str) -> Result<Note> {
        fields.validate()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("create_note", actor, |tx, ctx| {
            let note = insert_note(tx, fields, 0, ORIGIN_MANUAL, now)?;
            ctx.record_event("note", &note.id.to_string(), EventType::NoteCreated);
            Ok(note)
        })
    }

    /// Get a note by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_note(&self, id: i64) -> Result<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                [id],
                map_note_row,
            )
            .optional()?;
        Ok(note)
    }

    /// List notes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_notes(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(note_type) = filter.note_type {
            params.push(Box::new(note_type.as_str()));
            conditions.push(format!("note_type = ?{}", params.len()));
        }

        if let Some(tag) = &filter.tag {
            params.push(Box::new(tag.trim().to_string()));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM json_each(notes.tags) WHERE json_each.value = ?{} COLLATE NOCASE)",
                params.len()
            ));
        }

        if let Some(origin) = &filter.origin {
            params.push(Box::new(origin.clone()));
            conditions.push(format!("origin = ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        params.push(Box::new(filter.limit.map_or(-1, i64::from)));
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes{where_clause} ORDER BY id ASC LIMIT ?{}",
            params.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), map_note_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Count all notes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_notes(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Replace a note's content fields (local edit).
    ///
    /// # Errors
    ///
    /// Returns `NoteNotFound` if the note does not exist, or a validation error.
    pub fn update_note(&mut self, id: i64, fields: &NoteFields, actor: &str) -> Result<Note> {
        fields.validate()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_note", actor, |tx, ctx| {
            let note = update_note_row(tx, id, fields, ORIGIN_MANUAL, now)?;
            ctx.record_event("note", &id.to_string(), EventType::NoteUpdated);
            Ok(note)
        })
    }

    // =================
    // Source Operations
    // =================

    /// Get a source by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let source = self
            .conn
            .query_row(
                "SELECT id, source_type, label, url, created_at FROM sources WHERE id = ?1",
                [id],
                |row| {
                    Ok(Source {
                        id: row.get(0)?,
                        source_type: row.get(1)?,
                        label: row.get(2)?,
                        url: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(source)
    }

    // ====================
    // Sync Link Operations
    // ====================

    /// All sync links, ordered by note.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn read_sync_links(&self) -> Result<Vec<SyncLink>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {LINK_COLUMNS} FROM sync_links ORDER BY note_id"))?;
        let rows = stmt.query_map([], map_link_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Sync links pointing into one remote deck.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn read_sync_links_for_deck(&self, deck_id: &str) -> Result<Vec<SyncLink>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM sync_links WHERE deck_id = ?1 ORDER BY note_id"
        ))?;
        let rows = stmt.query_map([deck_id], map_link_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// The link for a note, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_link_by_note(&self, note_id: i64) -> Result<Option<SyncLink>> {
        let link = self
            .conn
            .query_row(
                &format!("SELECT {LINK_COLUMNS} FROM sync_links WHERE note_id = ?1"),
                [note_id],
                map_link_row,
            )
            .optional()?;
        Ok(link)
    }

    /// The link for a remote card, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_link_by_card(&self, card_id: &str) -> Result<Option<SyncLink>> {
        let link = self
            .conn
            .query_row(
                &format!("SELECT {LINK_COLUMNS} FROM sync_links WHERE card_id = ?1"),
                [card_id],
                map_link_row,
            )
            .optional()?;
        Ok(link)
    }

    /// Insert or replace a sync link.
    ///
    /// Any existing row for the same note or the same card is replaced,
    /// so the 1:1 pairing holds after every write.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_sync_link(&mut self, link: &SyncLink, actor: &str) -> Result<()> {
        self.mutate("write_sync_link", actor, |tx, ctx| upsert_link(tx, ctx, link))
    }

    /// Create a note, its provenance row and its sync link atomically.
    ///
    /// `link.note_id` is ignored and replaced with the new note's id.
    /// The note's origin is the source type.
    ///
    /// # Errors
    ///
    /// Returns a validation error or a database error; nothing is written
    /// on failure.
    pub fn create_linked_note(
        &mut self,
        fields: &NoteFields,
        source: &NewSource,
        link: &SyncLink,
        actor: &str,
    ) -> Result<(Note, SyncLink)> {
        fields.validate()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("create_linked_note", actor, |tx, ctx| {
            let source_id = insert_source(tx, source, now)?;
            ctx.record_event("source", &source_id.to_string(), EventType::SourceCreated);

            let note = insert_note(tx, fields, source_id, &source.source_type, now)?;
            ctx.record_event("note", &note.id.to_string(), EventType::NoteCreated);

            let link = SyncLink {
                note_id: note.id,
                ..link.clone()
            };
            upsert_link(tx, ctx, &link)?;
            Ok((note, link))
        })
    }

    /// Overwrite a note's content and its sync link atomically.
    ///
    /// # Errors
    ///
    /// Returns `NoteNotFound` if the note is gone; nothing is written on failure.
    pub fn update_note_with_link(
        &mut self,
        fields: &NoteFields,
        origin: &str,
        link: &SyncLink,
        actor: &str,
    ) -> Result<Note> {
        fields.validate()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_note_with_link", actor, |tx, ctx| {
            let note = update_note_row(tx, link.note_id, fields, origin, now)?;
            ctx.record_event("note", &note.id.to_string(), EventType::NoteUpdated);
            upsert_link(tx, ctx, link)?;
            Ok(note)
        })
    }

    // ==================
    // Backup Operations
    // ==================

    /// Copy the whole database into a new file at `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the online backup fails.
    pub fn snapshot_to(&self, dest: &Path) -> Result<()> {
        self.conn
            .backup(rusqlite::DatabaseName::Main, dest, None)?;
        Ok(())
    }

    /// Record a completed snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_backup(&mut self, snapshot: &BackupSnapshot, actor: &str) -> Result<()> {
        let path = snapshot.path.to_string_lossy().to_string();
        let size = i64::try_from(snapshot.size_bytes).unwrap_or(i64::MAX);

        self.mutate("record_backup", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO backup_snapshots (path, trigger_name, reason, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    path,
                    snapshot.trigger.as_str(),
                    snapshot.reason,
                    size,
                    snapshot.created_at
                ],
            )?;
            let mut event = Event::new("backup", &path, EventType::BackupCreated, &ctx.actor);
            if let Some(reason) = &snapshot.reason {
                event = event.with_comment(reason);
            }
            ctx.events.push(event);
            Ok(())
        })
    }

    /// Recorded snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_backups(&self, limit: Option<u32>) -> Result<Vec<BackupSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, trigger_name, reason, size_bytes, created_at
             FROM backup_snapshots
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit.map_or(-1, i64::from)], |row| {
            let trigger: String = row.get(1)?;
            let size: i64 = row.get(3)?;
            Ok(BackupSnapshot {
                path: PathBuf::from(row.get::<_, String>(0)?),
                trigger: trigger.parse::<BackupTrigger>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                reason: row.get(2)?,
                size_bytes: u64::try_from(size).unwrap_or(0),
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

// ================
// Row helpers
// ================

fn insert_note(
    conn: &Connection,
    fields: &NoteFields,
    source_id: i64,
    origin: &str,
    now: i64,
) -> Result<Note> {
    let tags = normalize_tags(&fields.tags);
    conn.execute(
        "INSERT INTO notes (note_type, front, back, cloze, extra, tags, source_id, origin, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        rusqlite::params![
            fields.note_type.as_str(),
            fields.front,
            fields.back,
            fields.cloze,
            fields.extra,
            serde_json::to_string(&tags)?,
            source_id,
            origin,
            now
        ],
    )?;

    Ok(Note {
        id: conn.last_insert_rowid(),
        fields: NoteFields {
            tags,
            ..fields.clone()
        },
        source_id,
        origin: origin.to_string(),
        created_at: now,
        updated_at: now,
    })
}

fn update_note_row(
    conn: &Connection,
    id: i64,
    fields: &NoteFields,
    origin: &str,
    now: i64,
) -> Result<Note> {
    let tags = normalize_tags(&fields.tags);
    let changed = conn.execute(
        "UPDATE notes
         SET note_type = ?2, front = ?3, back = ?4, cloze = ?5, extra = ?6, tags = ?7,
             origin = ?8, updated_at = ?9
         WHERE id = ?1",
        rusqlite::params![
            id,
            fields.note_type.as_str(),
            fields.front,
            fields.back,
            fields.cloze,
            fields.extra,
            serde_json::to_string(&tags)?,
            origin,
            now
        ],
    )?;
    if changed == 0 {
        return Err(Error::NoteNotFound { id });
    }

    conn.query_row(
        &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
        [id],
        map_note_row,
    )
    .map_err(Error::from)
}

fn insert_source(conn: &Connection, source: &NewSource, now: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO sources (source_type, label, url, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![source.source_type, source.label, source.url, now],
    )?;
    Ok(conn.last_insert_rowid())
}

fn upsert_link(conn: &Connection, ctx: &mut MutationContext, link: &SyncLink) -> Result<()> {
    let previous_card: Option<String> = conn
        .query_row(
            "SELECT card_id FROM sync_links WHERE note_id = ?1",
            [link.note_id],
            |row| row.get(0),
        )
        .optional()?;

    let removed = conn.execute(
        "DELETE FROM sync_links WHERE note_id = ?1 OR card_id = ?2",
        rusqlite::params![link.note_id, link.card_id],
    )?;

    conn.execute(
        &format!("INSERT INTO sync_links ({LINK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        rusqlite::params![
            link.note_id,
            link.card_id,
            link.deck_id,
            link.local_hash,
            link.remote_hash,
            link.remote_updated_at,
            link.last_synced_at
        ],
    )?;

    let same_pair = previous_card.as_deref() == Some(link.card_id.as_str());
    let note_id = link.note_id.to_string();
    if removed > usize::from(same_pair) {
        ctx.record_change(
            "link",
            &note_id,
            EventType::LinkReplaced,
            previous_card,
            Some(link.card_id.clone()),
        );
    } else {
        ctx.record_event("link", &note_id, EventType::LinkWritten);
    }
    Ok(())
}

fn map_note_row(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    let kind: String = row.get(1)?;
    let tags_json: String = row.get(6)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Note {
        id: row.get(0)?,
        fields: NoteFields {
            note_type: if kind == "cloze" {
                NoteType::Cloze
            } else {
                NoteType::Basic
            },
            front: row.get(2)?,
            back: row.get(3)?,
            cloze: row.get(4)?,
            extra: row.get(5)?,
            tags,
        },
        source_id: row.get(7)?,
        origin: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_link_row(row: &rusqlite::Row) -> rusqlite::Result<SyncLink> {
    Ok(SyncLink {
        note_id: row.get(0)?,
        card_id: row.get(1)?,
        deck_id: row.get(2)?,
        local_hash: row.get(3)?,
        remote_hash: row.get(4)?,
        remote_updated_at: row.get(5)?,
        last_synced_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ORIGIN_REMOTE_PULL;
    use crate::storage::events::get_events;

    fn pulled_source(card_id: &str) -> NewSource {
        NewSource {
            source_type: ORIGIN_REMOTE_PULL.to_string(),
            label: Some(format!("mochi:{card_id}")),
            url: Some(format!("mochi://card/{card_id}")),
        }
    }

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_note_crud() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let created = storage
            .create_note(&NoteFields::basic("Q", "A").with_tags(&["Rust Lang"]), "test")
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.origin, ORIGIN_MANUAL);
        assert_eq!(created.fields.tags, vec!["Rust-Lang"]);

        let fetched = storage.get_note(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);

        let updated = storage
            .update_note(created.id, &NoteFields::basic("Q2", "A2"), "test")
            .unwrap();
        assert_eq!(updated.fields.front, "Q2");
        assert_eq!(updated.created_at, created.created_at);

        let events = get_events(storage.conn(), "note", &created.id.to_string(), None).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_create_note_validates() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage.create_note(&NoteFields::cloze("no marker"), "test");
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
        assert_eq!(storage.count_notes().unwrap(), 0);
    }

    #[test]
    fn test_update_missing_note() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage.update_note(42, &NoteFields::basic("Q", "A"), "test");
        assert!(matches!(err, Err(Error::NoteNotFound { id: 42 })));
    }

    #[test]
    fn test_list_notes_filters() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .create_note(&NoteFields::basic("Q1", "A").with_tags(&["geo"]), "t")
            .unwrap();
        storage
            .create_note(&NoteFields::cloze("{{c1::Paris}}").with_tags(&["Geo"]), "t")
            .unwrap();
        storage
            .create_note(&NoteFields::basic("Q3", "A"), "t")
            .unwrap();

        let all = storage.list_notes(&NoteFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let geo = storage
            .list_notes(&NoteFilter {
                tag: Some("geo".into()),
                ..NoteFilter::default()
            })
            .unwrap();
        assert_eq!(geo.len(), 2);

        let cloze_geo = storage
            .list_notes(&NoteFilter {
                tag: Some("geo".into()),
                note_type: Some(NoteType::Cloze),
                ..NoteFilter::default()
            })
            .unwrap();
        assert_eq!(cloze_geo.len(), 1);

        let limited = storage
            .list_notes(&NoteFilter {
                limit: Some(1),
                ..NoteFilter::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_write_sync_link_keeps_one_to_one() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = storage.create_note(&NoteFields::basic("A", "1"), "t").unwrap();
        let b = storage.create_note(&NoteFields::basic("B", "2"), "t").unwrap();

        storage
            .write_sync_link(&SyncLink::new(a.id, "c1", "d", "la", "ra"), "t")
            .unwrap();
        storage
            .write_sync_link(&SyncLink::new(b.id, "c2", "d", "lb", "rb"), "t")
            .unwrap();

        // Same pair: hash update in place.
        storage
            .write_sync_link(&SyncLink::new(a.id, "c1", "d", "la2", "ra"), "t")
            .unwrap();
        assert_eq!(storage.get_link_by_note(a.id).unwrap().unwrap().local_hash, "la2");

        // Card c2 moves to note a: both old rows go away.
        storage
            .write_sync_link(&SyncLink::new(a.id, "c2", "d", "x", "y"), "t")
            .unwrap();
        let links = storage.read_sync_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].note_id, a.id);
        assert_eq!(links[0].card_id, "c2");
        assert!(storage.get_link_by_note(b.id).unwrap().is_none());
        assert!(storage.get_link_by_card("c1").unwrap().is_none());

        let events = get_events(storage.conn(), "link", &a.id.to_string(), None).unwrap();
        assert_eq!(events[0].event_type, EventType::LinkReplaced);
        assert_eq!(events[0].old_value.as_deref(), Some("c1"));
    }

    #[test]
    fn test_create_linked_note_is_atomic() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let template = SyncLink::new(0, "c9", "d", "l", "r");

        let (note, link) = storage
            .create_linked_note(
                &NoteFields::basic("Q", "A"),
                &pulled_source("c9"),
                &template,
                "t",
            )
            .unwrap();
        assert_eq!(link.note_id, note.id);
        assert_eq!(note.origin, ORIGIN_REMOTE_PULL);
        let source = storage.get_source(note.source_id).unwrap().unwrap();
        assert_eq!(source.url.as_deref(), Some("mochi://card/c9"));

        // Invalid fields: no source, note or link is written.
        let err = storage.create_linked_note(
            &NoteFields::basic("", "A"),
            &pulled_source("c10"),
            &SyncLink::new(0, "c10", "d", "l", "r"),
            "t",
        );
        assert!(err.is_err());
        assert_eq!(storage.count_notes().unwrap(), 1);
        assert!(storage.get_link_by_card("c10").unwrap().is_none());
    }

    #[test]
    fn test_update_note_with_link() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let (note, link) = storage
            .create_linked_note(
                &NoteFields::basic("Q", "A"),
                &pulled_source("c1"),
                &SyncLink::new(0, "c1", "d", "l", "r"),
                "t",
            )
            .unwrap();

        let next = SyncLink {
            remote_hash: "r2".into(),
            ..link
        };
        let updated = storage
            .update_note_with_link(&NoteFields::basic("Q", "B"), ORIGIN_REMOTE_PULL, &next, "t")
            .unwrap();
        assert_eq!(updated.id, note.id);
        assert_eq!(updated.fields.back, "B");
        assert_eq!(storage.get_link_by_card("c1").unwrap().unwrap().remote_hash, "r2");

        let orphan = SyncLink::new(999, "c5", "d", "l", "r");
        let err = storage.update_note_with_link(&NoteFields::basic("Q", "B"), ORIGIN_REMOTE_PULL, &orphan, "t");
        assert!(matches!(err, Err(Error::NoteNotFound { id: 999 })));
        assert!(storage.get_link_by_card("c5").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_and_backup_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.create_note(&NoteFields::basic("Q", "A"), "t").unwrap();

        let dest = dir.path().join("snap.sqlite3");
        storage.snapshot_to(&dest).unwrap();

        let copy = SqliteStorage::open(&dest).unwrap();
        assert_eq!(copy.count_notes().unwrap(), 1);

        for (created_at, trigger) in [(1, BackupTrigger::Push), (2, BackupTrigger::Manual)] {
            storage
                .record_backup(
                    &BackupSnapshot {
                        path: dir.path().join(format!("{created_at}.sqlite3")),
                        trigger,
                        reason: None,
                        created_at,
                        size_bytes: 10,
                    },
                    "t",
                )
                .unwrap();
        }
        let backups = storage.list_backups(None).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].trigger, BackupTrigger::Manual);
    }

    #[test]
    fn test_backup_event_keeps_reason() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let path = PathBuf::from("/tmp/before-repair.sqlite3");
        storage
            .record_backup(
                &BackupSnapshot {
                    path: path.clone(),
                    trigger: BackupTrigger::Repair,
                    reason: Some("repair".to_string()),
                    created_at: 1,
                    size_bytes: 10,
                },
                "sync:abc",
            )
            .unwrap();

        let events = get_events(storage.conn(), "backup", &path.to_string_lossy(), None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::BackupCreated);
        assert_eq!(events[0].actor, "sync:abc");
        assert_eq!(events[0].comment.as_deref(), Some("repair"));
    }
}
