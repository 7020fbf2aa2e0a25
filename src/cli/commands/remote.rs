//! Remote deck commands.

use crate::cli::RemoteCommands;
use crate::config::{SyncOptions, load_config, resolve_remote_settings, save_config};
use crate::error::{Error, Result};
use crate::remote::{MochiClient, RemoteDeck};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct DecksOutput<'a> {
    decks: &'a [RemoteDeck],
    #[serde(skip_serializing_if = "Option::is_none")]
    selected: Option<&'a str>,
}

#[derive(Serialize)]
struct CreatedOutput<'a> {
    id: &'a str,
    name: &'a str,
    selected: bool,
}

/// Execute remote commands.
pub fn execute(command: &RemoteCommands, json: bool) -> Result<()> {
    let settings = resolve_remote_settings()?;
    let client = MochiClient::from_settings(&settings, &SyncOptions::from_env())?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    match command {
        RemoteCommands::Decks => {
            let decks = rt.block_on(client.list_decks())?;
            let selected = settings.deck_id.as_deref();

            if json {
                let output = DecksOutput {
                    decks: &decks,
                    selected,
                };
                println!("{}", serde_json::to_string(&output)?);
            } else if decks.is_empty() {
                println!("No decks found.");
            } else {
                for deck in &decks {
                    let marker = if Some(deck.id.as_str()) == selected {
                        "*".green().bold()
                    } else {
                        " ".normal()
                    };
                    println!("{marker} {}  {}", deck.id.cyan(), deck.name);
                }
            }
        }
        RemoteCommands::CreateDeck { name, select } => {
            let id = rt.block_on(client.create_deck(name))?;

            if *select {
                let mut config = load_config()?;
                config.remote.deck_id = Some(id.clone());
                save_config(&config)?;
            }

            if json {
                let output = CreatedOutput {
                    id: &id,
                    name,
                    selected: *select,
                };
                println!("{}", serde_json::to_string(&output)?);
            } else {
                println!("Created deck {} ({})", name, id.cyan());
                if *select {
                    println!("Selected as the sync target.");
                }
            }
        }
    }
    Ok(())
}
