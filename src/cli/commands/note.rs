//! Note command implementations.

use super::{actor_name, open_storage};
use crate::cli::{EditArgs, ListArgs, NoteCommands, NoteExtraArgs};
use crate::error::{Error, Result};
use crate::model::{Note, NoteFields, NoteFilter, NoteType, SyncLink};
use crate::storage::SqliteStorage;
use crate::sync::note_hash;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct NoteOutput<'a> {
    #[serde(flatten)]
    note: &'a Note,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a SyncLink>,
    /// Changed since the last push (only meaningful when linked).
    changed_since_push: bool,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    notes: &'a [Note],
    count: usize,
}

/// Execute note commands.
pub fn execute(
    command: &NoteCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let (_, mut storage) = open_storage(db_path)?;
    let actor = actor_name(actor);

    match command {
        NoteCommands::AddBasic { front, back, extra } => {
            let fields = with_extra(NoteFields::basic(front, back), extra);
            add(&mut storage, &fields, &actor, json)
        }
        NoteCommands::AddCloze { text, extra } => {
            let fields = with_extra(NoteFields::cloze(text), extra);
            add(&mut storage, &fields, &actor, json)
        }
        NoteCommands::List(args) => list(&storage, args, json),
        NoteCommands::Show { id } => show(&storage, *id, json),
        NoteCommands::Edit(args) => edit(&mut storage, args, &actor, json),
    }
}

fn with_extra(mut fields: NoteFields, args: &NoteExtraArgs) -> NoteFields {
    if let Some(extra) = &args.extra {
        fields = fields.with_extra(extra);
    }
    if !args.tags.is_empty() {
        fields = fields.with_tags(&args.tags);
    }
    fields
}

fn add(storage: &mut SqliteStorage, fields: &NoteFields, actor: &str, json: bool) -> Result<()> {
    let note = storage.create_note(fields, actor)?;

    if json {
        println!("{}", serde_json::to_string(&note)?);
    } else {
        println!("Created {} note #{}", note.fields.note_type, note.id);
        println!("  {}", note.fields.preview(72).dimmed());
    }
    Ok(())
}

fn list(storage: &SqliteStorage, args: &ListArgs, json: bool) -> Result<()> {
    let filter = NoteFilter {
        note_type: args
            .note_type
            .as_deref()
            .map(str::parse::<NoteType>)
            .transpose()?,
        tag: args.tag.clone(),
        origin: args.origin.clone(),
        limit: Some(args.limit),
    };
    let notes = storage.list_notes(&filter)?;

    if json {
        let output = ListOutput {
            notes: &notes,
            count: notes.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if notes.is_empty() {
        println!("No notes found.");
        return Ok(());
    }

    for note in &notes {
        let linked = if storage.get_link_by_note(note.id)?.is_some() {
            "linked".green()
        } else {
            "local".yellow()
        };
        println!(
            "#{:<5} {:<6} {:<7} {}",
            note.id,
            note.fields.note_type.to_string(),
            linked,
            note.fields.preview(60)
        );
    }
    println!();
    println!("{} note(s)", notes.len());
    Ok(())
}

fn show(storage: &SqliteStorage, id: i64, json: bool) -> Result<()> {
    let note = storage.get_note(id)?.ok_or(Error::NoteNotFound { id })?;
    let link = storage.get_link_by_note(id)?;
    let changed_since_push = link
        .as_ref()
        .is_some_and(|l| l.local_hash != note_hash(&note.fields));

    if json {
        let output = NoteOutput {
            note: &note,
            link: link.as_ref(),
            changed_since_push,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let fields = &note.fields;
    println!("{} #{} ({})", "Note".bold(), note.id, fields.note_type);
    match fields.note_type {
        NoteType::Basic => {
            println!("  Front: {}", fields.front);
            println!("  Back:  {}", fields.back);
        }
        NoteType::Cloze => println!("  Text:  {}", fields.cloze),
    }
    if !fields.extra.is_empty() {
        println!("  Extra: {}", fields.extra);
    }
    if !fields.tags.is_empty() {
        println!("  Tags:  {}", fields.tags.join(", "));
    }
    println!("  Origin: {}", note.origin);
    if note.source_id != 0 {
        if let Some(source) = storage.get_source(note.source_id)? {
            println!(
                "  Source: {} ({})",
                source.label.as_deref().unwrap_or(&source.source_type),
                source.url.as_deref().unwrap_or("-")
            );
        }
    }

    println!();
    match link {
        Some(link) => {
            println!("  Card:  {} in deck {}", link.card_id, link.deck_id);
            if changed_since_push {
                println!(
                    "  {}",
                    "Changed locally since last push (use `cardsync sync repair --changed-only`)"
                        .yellow()
                );
            }
        }
        None => println!("  {}", "Not pushed yet".dimmed()),
    }
    Ok(())
}

fn edit(storage: &mut SqliteStorage, args: &EditArgs, actor: &str, json: bool) -> Result<()> {
    let current = storage
        .get_note(args.id)?
        .ok_or(Error::NoteNotFound { id: args.id })?;

    let mut fields = current.fields.clone();
    if let Some(front) = &args.front {
        fields.front.clone_from(front);
    }
    if let Some(back) = &args.back {
        fields.back.clone_from(back);
    }
    if let Some(cloze) = &args.cloze {
        fields.cloze.clone_from(cloze);
    }
    if let Some(extra) = &args.extra {
        fields.extra.clone_from(extra);
    }
    if args.clear_tags {
        fields.tags.clear();
    } else if !args.tags.is_empty() {
        fields = fields.with_tags(&args.tags);
    }

    if fields == current.fields {
        return Err(Error::InvalidArgument(
            "nothing to change: pass at least one of --front, --back, --cloze, --extra, --tag"
                .to_string(),
        ));
    }

    let note = storage.update_note(args.id, &fields, actor)?;
    if json {
        println!("{}", serde_json::to_string(&note)?);
    } else {
        println!("Updated note #{}", note.id);
        if storage.get_link_by_note(note.id)?.is_some() {
            println!(
                "{}",
                "Note is linked; the remote card keeps the old content until a repair.".dimmed()
            );
        }
    }
    Ok(())
}
