//! Backup snapshot model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which operation asked for a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTrigger {
    Push,
    Pull,
    Both,
    Repair,
    Manual,
}

impl BackupTrigger {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Both => "both",
            Self::Repair => "repair",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for BackupTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackupTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            "both" => Ok(Self::Both),
            "repair" => Ok(Self::Repair),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown backup trigger: {s}")),
        }
    }
}

/// An immutable point-in-time copy of the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub path: PathBuf,
    pub trigger: BackupTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Unix milliseconds.
    pub created_at: i64,
    pub size_bytes: u64,
}
