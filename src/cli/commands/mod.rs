//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod keys;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "transgate")]
#[command(about = "Self-hosted translation API server with request governance")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the translation server
    Serve {
        #[command(flatten)]
        settings: Settings,
    },

    /// Manage the local API key database
    Keys {
        /// Path to the API key database
        #[arg(long, env = "TRANSGATE_API_KEYS_DB_PATH", default_value = "db/api_keys.db")]
        api_keys_db_path: PathBuf,

        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// List all keys
    List,
    /// Add a key
    Add {
        /// Requests per minute allowed for this key
        req_limit: i64,
        /// Use this key instead of generating one
        #[arg(long)]
        key: Option<String>,
        /// Character limit per text for this key (0 = global limit)
        #[arg(long)]
        char_limit: Option<i64>,
    },
    /// Remove a key
    Remove {
        /// Key to remove
        key: String,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { settings } => serve::cmd_serve(settings).await,
        Commands::Keys {
            api_keys_db_path,
            command,
        } => match command {
            KeyCommands::List => keys::cmd_keys_list(&api_keys_db_path),
            KeyCommands::Add {
                req_limit,
                key,
                char_limit,
            } => keys::cmd_keys_add(&api_keys_db_path, req_limit, key, char_limit),
            KeyCommands::Remove { key } => keys::cmd_keys_remove(&api_keys_db_path, &key),
        },
    }
}
