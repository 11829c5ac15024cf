use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::store::DEFAULT_LIMIT;

#[derive(Parser)]
#[command(name = "cliphistd", about = "Clipboard history picker daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the session coordinator daemon
    Daemon {
        /// History store file (defaults to the data directory)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Toggle hotkey binding
        #[arg(long, default_value = "Super+Shift+L")]
        hotkey: String,

        /// Entries fetched when the hotkey reveals the overlay
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },

    /// Run the picker overlay in this terminal
    Overlay,

    /// Query the daemon and print entries
    Query {
        #[command(subcommand)]
        command: QueryCommand,
    },
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Most recent entries
    Recent {
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },

    /// Entries matching a query
    Search {
        query: String,

        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,

        /// Restrict to entry kinds (repeatable)
        #[arg(long = "kind")]
        kinds: Vec<KindArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Text,
    Path,
    Other,
}
