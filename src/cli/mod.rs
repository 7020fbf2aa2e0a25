//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for list/query commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
}

pub mod commands;

/// cardsync - two-way sync between local flashcards and a Mochi deck
#[derive(Parser, Debug)]
#[command(name = "cardsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.cardsync/data/cardsync.db)
    #[arg(long, global = true, env = "CARDSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for the audit trail
    #[arg(long, global = true, env = "CARDSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the local database
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Local notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Sync notes with the remote deck
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Database snapshots
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Remote decks
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },

    /// Remote connection settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Note Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Add a front/back note
    AddBasic {
        /// Question side
        front: String,
        /// Answer side
        back: String,
        #[command(flatten)]
        extra: NoteExtraArgs,
    },

    /// Add a cloze note (`{{c1::hidden}}` markers)
    AddCloze {
        /// Cloze text
        text: String,
        #[command(flatten)]
        extra: NoteExtraArgs,
    },

    /// List notes
    List(ListArgs),

    /// Show one note with its sync link
    Show {
        /// Note ID
        id: i64,
    },

    /// Edit a note (unset flags keep their value)
    Edit(EditArgs),
}

#[derive(Args, Debug, Default)]
pub struct NoteExtraArgs {
    /// Extra notes shown under the answer
    #[arg(long)]
    pub extra: Option<String>,

    /// Tag (repeatable)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by note type (basic, cloze)
    #[arg(long = "type")]
    pub note_type: Option<String>,

    /// Filter by tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Filter by origin (manual, remote_pull)
    #[arg(long)]
    pub origin: Option<String>,

    /// Maximum notes to return
    #[arg(long, short = 'l', default_value = "50")]
    pub limit: u32,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Note ID
    pub id: i64,

    #[arg(long)]
    pub front: Option<String>,

    #[arg(long)]
    pub back: Option<String>,

    #[arg(long)]
    pub cloze: Option<String>,

    #[arg(long)]
    pub extra: Option<String>,

    /// Replace tags (repeatable)
    #[arg(long = "tag", short = 't')]
    pub tags: Vec<String>,

    /// Remove all tags
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Create remote cards for unlinked notes
    Push(RunArgs),

    /// Import and update notes from remote cards
    Pull(RunArgs),

    /// Push, then pull
    Both(RunArgs),

    /// Show local sync state (no remote calls)
    Status,

    /// Delete and recreate linked remote cards from local notes
    Repair {
        /// Only notes changed locally since their last push
        #[arg(long)]
        changed_only: bool,

        /// Target deck (default: configured deck)
        #[arg(long)]
        deck: Option<String>,

        /// Confirm the remote deletions
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Target deck (default: configured deck)
    #[arg(long)]
    pub deck: Option<String>,

    /// Maximum concurrent remote calls
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-call remote timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

// ============================================================================
// Backup Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Snapshot the database now
    Create {
        /// Why the snapshot was taken
        #[arg(long)]
        reason: Option<String>,
    },

    /// List snapshots, newest first
    List {
        #[arg(long, short = 'l', default_value = "20")]
        limit: u32,
    },
}

// ============================================================================
// Remote Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    /// List remote decks
    Decks,

    /// Create a remote deck
    CreateDeck {
        /// Deck name
        name: String,

        /// Also make it the configured target deck
        #[arg(long)]
        select: bool,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective remote settings
    Show,

    /// Save the API key
    SetKey {
        key: String,
    },

    /// Save the target deck
    SetDeck {
        deck_id: String,
    },

    /// Save the API base URL
    SetUrl {
        url: String,
    },
}
