//! Version command implementation.

use crate::error::Result;
use crate::remote::mochi::DEFAULT_BASE_URL;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    schema_version: i32,
    default_remote: &'a str,
}

/// Print the crate version, build profile and local schema version.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput {
        version: env!("CARGO_PKG_VERSION"),
        build: if cfg!(debug_assertions) { "dev" } else { "release" },
        schema_version: CURRENT_SCHEMA_VERSION,
        default_remote: DEFAULT_BASE_URL,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "cardsync {} ({}, schema v{})",
            output.version, output.build, output.schema_version
        );
    }
    Ok(())
}
