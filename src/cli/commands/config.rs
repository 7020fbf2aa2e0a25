//! Config command implementations.
//!
//! Values saved here take precedence over the `MOCHI_*` environment
//! variables, which only fill fields the config file leaves unset.

use crate::cli::ConfigCommands;
use crate::config::{RemoteSettings, config_path, load_config, save_config};
use crate::error::{Error, Result};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct ShowOutput {
    config_path: String,
    api_key: FieldOutput,
    deck_id: FieldOutput,
    base_url: FieldOutput,
}

#[derive(Serialize)]
struct FieldOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    source: &'static str,
}

/// Execute config commands.
pub fn execute(command: &ConfigCommands, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(json),
        ConfigCommands::SetKey { key } => set(json, "api_key", |r| r.api_key = Some(key.clone())),
        ConfigCommands::SetDeck { deck_id } => {
            set(json, "deck_id", |r| r.deck_id = Some(deck_id.clone()))
        }
        ConfigCommands::SetUrl { url } => {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::InvalidArgument(format!(
                    "base URL must start with http:// or https://, got '{url}'"
                )));
            }
            let url = url.trim_end_matches('/').to_string();
            set(json, "base_url", |r| r.base_url = Some(url))
        }
    }
}

fn set(json: bool, field: &str, apply: impl FnOnce(&mut RemoteSettings)) -> Result<()> {
    let mut config = load_config()?;
    apply(&mut config.remote);
    save_config(&config)?;

    let path = config_path()?;
    if json {
        let output = serde_json::json!({
            "updated": field,
            "config_path": path.display().to_string(),
        });
        println!("{output}");
    } else {
        println!("Saved {field} to {}", path.display());
    }
    Ok(())
}

/// Mask all but the last four characters of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

fn show(json: bool) -> Result<()> {
    let saved = load_config()?.remote;
    let env = RemoteSettings::from_env();
    let effective = saved.clone().or(env.clone());

    let output = ShowOutput {
        config_path: config_path()?.display().to_string(),
        api_key: FieldOutput {
            value: effective.api_key.as_deref().map(mask),
            source: RemoteSettings::source_of(saved.api_key.as_ref(), env.api_key.as_ref()),
        },
        deck_id: FieldOutput {
            value: effective.deck_id.clone(),
            source: RemoteSettings::source_of(saved.deck_id.as_ref(), env.deck_id.as_ref()),
        },
        base_url: FieldOutput {
            value: Some(effective.base_url().to_string()),
            source: match RemoteSettings::source_of(
                saved.base_url.as_ref(),
                env.base_url.as_ref(),
            ) {
                "missing" => "default",
                other => other,
            },
        },
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "Remote Settings".bold().underline());
    println!("  Config:   {}", output.config_path);
    for (name, field) in [
        ("API key", &output.api_key),
        ("Deck", &output.deck_id),
        ("Base URL", &output.base_url),
    ] {
        let value = field
            .value
            .clone()
            .unwrap_or_else(|| "not set".to_string());
        let value = if field.source == "missing" {
            value.yellow()
        } else {
            value.normal()
        };
        println!("  {name:<9} {value} {}", format!("({})", field.source).dimmed());
    }
    Ok(())
}
