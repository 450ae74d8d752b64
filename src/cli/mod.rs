//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// offsync - Offline-first sync engine
#[derive(Parser, Debug)]
#[command(name = "offsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.offsync/data/offsync.db)
    #[arg(long, global = true, env = "OFFSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Treat the device as offline (sync requests are rejected)
    #[arg(long, global = true)]
    pub offline: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the local database
    Init {
        /// Recreate the database, discarding local data and queued mutations
        #[arg(long)]
        force: bool,
    },

    /// Save a record locally and queue it for upload
    Put {
        /// Entity type (debtors, credits, collaterals, notifications, users)
        entity: String,

        /// Record as a JSON object. An `id` is generated when absent.
        data: String,
    },

    /// Delete a record locally and queue the remote delete
    Delete {
        /// Entity type
        entity: String,

        /// Record id
        id: String,
    },

    /// Show stored records
    Get {
        /// Entity type
        entity: String,

        /// Record id (lists active records when omitted)
        id: Option<String>,

        /// Include soft-deleted records when listing
        #[arg(long)]
        all: bool,

        /// Filter by an indexed field (`field=value`)
        #[arg(long = "where", value_name = "FIELD=VALUE", conflicts_with_all = ["id", "all"])]
        filter: Option<String>,
    },

    /// Synchronize with the remote backend
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },

    /// Show sync status and storage statistics
    Status,

    /// Inspect and manage the mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Apply server-pushed changes until interrupted
    Watch {
        /// Tables to subscribe to (default: all)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Upload the queue, then download fresh snapshots (default)
    Full,

    /// Upload queued mutations only
    Up,

    /// Download remote snapshots only
    Down {
        /// Tables to download (default: configured download tables)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },

    /// Pull a single record from the server
    Entity {
        /// Entity type
        entity: String,

        /// Record id
        id: String,
    },
}

// ============================================================================
// Queue Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List queue items
    List {
        /// Filter by status (pending, processing, completed, failed)
        #[arg(long)]
        status: Option<String>,

        /// Only items that exhausted their retries
        #[arg(long, conflicts_with = "status")]
        stuck: bool,
    },

    /// Reset a failed item to pending
    Requeue {
        /// Queue item id
        id: String,
    },

    /// Remove completed items
    Clear,
}
