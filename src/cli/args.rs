//! CLI argument definitions using clap
//!
//! Commands:
//! - arbordb write <domain>    (stdin: document or array of documents)
//! - arbordb query <domain>    (stdin: query request)
//! - arbordb update <domain>   (stdin: update request)
//! - arbordb delete <domain>   (stdin: delete request)
//! - arbordb sweep <domain>
//! - arbordb stats

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// arbordb - a tree-indexed document store
#[derive(Parser, Debug)]
#[command(name = "arbordb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Snapshot file holding every collection
    #[arg(long, default_value = "./arbordb.snapshot.json")]
    pub data: PathBuf,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Project id for change topics (default: config project_id)
    #[arg(long)]
    pub app: Option<String>,

    /// Caller uid recorded as createdBy
    #[arg(long)]
    pub uid: Option<String>,

    /// Allow access to reserved domains
    #[arg(long)]
    pub master_key: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store one document or an array of documents
    Write {
        /// Target domain
        domain: String,
    },

    /// Resolve a query
    Query {
        /// Target domain
        domain: String,
    },

    /// Apply $set/$inc to matching documents
    Update {
        /// Target domain
        domain: String,
    },

    /// Delete matching documents
    Delete {
        /// Target domain
        domain: String,
    },

    /// Repair the index of a domain and drop empty nodes
    Sweep {
        /// Target domain
        domain: String,
    },

    /// Report collection sizes
    Stats,
}

impl Command {
    /// Whether the command reads a JSON request from stdin
    pub fn reads_request(&self) -> bool {
        matches!(
            self,
            Command::Write { .. } | Command::Query { .. } | Command::Update { .. } | Command::Delete { .. }
        )
    }

    /// Whether the command can change stored data
    pub fn mutates(&self) -> bool {
        !matches!(self, Command::Query { .. } | Command::Stats)
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
