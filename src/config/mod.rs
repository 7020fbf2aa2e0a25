//! Configuration management.
//!
//! This module resolves where the local store lives, where backups and
//! run locks go, and how to reach the remote card service.
//!
//! # Layout
//!
//! - **Database**: `~/.cardsync/data/cardsync.db` (or `--db` / `CARDSYNC_DB`)
//! - **Backups**: `<db dir>/backups/` (or `CARDSYNC_BACKUP_DIR`)
//! - **Locks**: `<db dir>/locks/<deck>.lock`
//! - **Settings**: `~/.cardsync/config.json` (or `CARDSYNC_CONFIG`)
//!
//! Remote settings saved in the config file take precedence; the
//! `MOCHI_*` environment variables provide machine-wide defaults.

use crate::error::{Error, Result};
use crate::remote::mochi::DEFAULT_BASE_URL;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Get the global cardsync directory (`~/.cardsync/`).
#[must_use]
pub fn global_cardsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cardsync"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `CARDSYNC_TEST_DB=1` (or any non-empty
/// value other than `0`/`false`). This redirects all database operations
/// to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("CARDSYNC_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the test database path (`~/.cardsync/test/cardsync.db`).
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_cardsync_dir().map(|dir| dir.join("test").join("cardsync.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CARDSYNC_TEST_DB` environment variable → uses test database
/// 3. `CARDSYNC_DB` environment variable
/// 4. Global location: `~/.cardsync/data/cardsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("CARDSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_cardsync_dir().map(|dir| dir.join("data").join("cardsync.db"))
}

/// Directory holding the database file.
fn db_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Resolve where backup snapshots are written.
#[must_use]
pub fn resolve_backup_dir(db_path: &Path) -> PathBuf {
    match std::env::var("CARDSYNC_BACKUP_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => db_dir(db_path).join("backups"),
    }
}

/// Directory for per-deck run lock files.
#[must_use]
pub fn lock_dir(db_path: &Path) -> PathBuf {
    db_dir(db_path).join("locks")
}

/// Read and parse an environment variable, ignoring blanks and junk.
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ── Remote settings ──────────────────────────────────────────

/// How to reach the remote card service.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("deck_id", &self.deck_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RemoteSettings {
    /// API root, falling back to the public Mochi endpoint.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// The configured target deck.
    ///
    /// # Errors
    ///
    /// Returns a config error if no deck has been chosen.
    pub fn require_deck_id(&self) -> Result<&str> {
        self.deck_id
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::Config("No target deck configured".to_string()))
    }

    /// Fill unset fields from `defaults`.
    #[must_use]
    pub fn or(self, defaults: Self) -> Self {
        Self {
            api_key: self.api_key.or(defaults.api_key),
            deck_id: self.deck_id.or(defaults.deck_id),
            base_url: self.base_url.or(defaults.base_url),
        }
    }

    /// Settings from the `MOCHI_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("MOCHI_API_KEY"),
            deck_id: env_string("MOCHI_DECK_ID"),
            base_url: env_string("MOCHI_BASE_URL"),
        }
    }

    /// Where a field's effective value came from, for `config show`.
    #[must_use]
    pub fn source_of(saved: Option<&String>, env: Option<&String>) -> &'static str {
        match (saved, env) {
            (Some(_), _) => "config",
            (None, Some(_)) => "env",
            (None, None) => "missing",
        }
    }
}

/// Persisted cardsync settings (`config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardsyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,
}

/// Get the config file path.
///
/// # Errors
///
/// Returns a config error if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = env_string("CARDSYNC_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    global_cardsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load the config file, or defaults when it does not exist.
///
/// # Errors
///
/// Returns a config error if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<CardsyncConfig> {
    let path = config_path()?;

    if !path.exists() {
        return Ok(CardsyncConfig::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the config file, creating its directory if needed.
///
/// # Errors
///
/// Returns a config error if the file cannot be written.
pub fn save_config(config: &CardsyncConfig) -> Result<()> {
    let path = config_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(&path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

    Ok(())
}

/// Effective remote settings: saved config first, env as fallback.
///
/// # Errors
///
/// Returns a config error if the config file is unreadable.
pub fn resolve_remote_settings() -> Result<RemoteSettings> {
    Ok(load_config()?.remote.or(RemoteSettings::from_env()))
}

// ── Engine tuning ────────────────────────────────────────────

/// Tuning knobs for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum concurrent remote calls within one job.
    pub concurrency: usize,
    /// Per-call remote timeout.
    pub timeout: Duration,
    /// Page size for card listing (clamped to 1..=200 by the client).
    pub fetch_page_size: usize,
    /// Extra attempts for a rate-limited call.
    pub rate_limit_retries: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(25),
            fetch_page_size: 100,
            rate_limit_retries: 2,
        }
    }
}

impl SyncOptions {
    /// Defaults overridden by `CARDSYNC_*` / `MOCHI_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse::<usize>("CARDSYNC_CONCURRENCY")
                .unwrap_or(defaults.concurrency)
                .max(1),
            timeout: env_parse::<u64>("CARDSYNC_REMOTE_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map_or(defaults.timeout, Duration::from_secs),
            fetch_page_size: env_parse("MOCHI_SYNC_FETCH_LIMIT")
                .unwrap_or(defaults.fetch_page_size),
            rate_limit_retries: env_parse("MOCHI_RATE_LIMIT_RETRIES")
                .unwrap_or(defaults.rate_limit_retries),
        }
    }
}
