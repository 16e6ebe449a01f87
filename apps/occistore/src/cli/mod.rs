//! # occistore CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the protocol adapter
//! - `status` - Show store statistics
//! - `find` - Show the descriptor of an entity
//! - `load` - Show the full content of an entity
//! - `list` - List the members of a category
//! - `delete` - Delete an entity (cascading) or dissociate a mixin
//! - `export` - Write a binary snapshot
//! - `import` - Load a binary snapshot

mod commands;

use crate::config::{Backend, Config, ConfigError};
use clap::{Parser, Subcommand};
use occistore_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// occistore - typed, versioned entity/link graph store
#[derive(Parser, Debug)]
#[command(name = "occistore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend (overrides the configuration)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Path to the store database or snapshot file (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP protocol adapter
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show store statistics
    Status,

    /// Show the descriptor of an entity
    Find {
        /// Entity id
        id: String,
    },

    /// Show the full content of an entity
    Load {
        /// Entity id
        id: String,
    },

    /// List the members of a category (or a single entity by id)
    List {
        /// Category or entity id
        category: String,
    },

    /// Delete an entity and its outgoing links, or dissociate a mixin
    Delete {
        /// Entity or mixin id
        id: String,
    },

    /// Export all entities as a binary snapshot
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import entities from a binary snapshot
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve configuration layers: file and environment, then CLI flags.
pub fn resolve_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Find { id }) => cmd_find(&config, json_mode, &id),
        Some(Commands::Load { id }) => cmd_load(&config, json_mode, &id),
        Some(Commands::List { category }) => cmd_list(&config, json_mode, &category),
        Some(Commands::Delete { id }) => cmd_delete(&config, &id),
        Some(Commands::Export { output }) => cmd_export(&config, &output),
        Some(Commands::Import { input }) => cmd_import(&config, &input),
    }
}
