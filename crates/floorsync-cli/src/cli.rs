use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use floorsync_core::{Priority, ResolveChoice};

#[derive(Parser)]
#[command(name = "floorsync")]
#[command(about = "Offline-first record store for factory floor dashboards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding the persisted record store
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// HTTP endpoint records are POSTed to during sync
    #[arg(long, global = true, value_name = "URL", env = "FLOORSYNC_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Treat the network as unavailable
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a record for later delivery
    #[command(alias = "add")]
    Save {
        /// Record type (e.g. job_update, andon_event)
        record_type: String,
        /// JSON payload; plain text is stored as a JSON string
        payload: String,
        /// Delivery priority
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
    },
    /// Show stored payloads of one type, newest first
    #[command(alias = "list")]
    Get {
        /// Record type
        record_type: String,
        /// Only the record with this ID
        #[arg(long)]
        id: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a record by ID
    Delete {
        /// Record ID
        id: String,
    },
    /// Delete every record of one type
    Clear {
        /// Record type
        record_type: String,
    },
    /// Show sync status counters
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records awaiting delivery, in delivery order
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List pending records that have failed at least once
    Failed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records that exhausted their retries
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync pass now
    Sync,
    /// Re-queue all conflicted records
    Retry,
    /// Resolve all conflicted records
    Resolve {
        /// What to do with the local copies
        #[arg(long, value_enum)]
        choice: ResolveArg,
    },
    /// Delete every stored record
    ClearStorage {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolveArg {
    /// Re-queue for another round of delivery
    KeepLocal,
    /// Drop the local copies
    DiscardLocal,
}

impl From<ResolveArg> for ResolveChoice {
    fn from(value: ResolveArg) -> Self {
        match value {
            ResolveArg::KeepLocal => Self::KeepLocal,
            ResolveArg::DiscardLocal => Self::DiscardLocal,
        }
    }
}
