//! # vaultsync
//!
//! Command line host for vaultsync.
//!
//! ## Commands
//!
//! - `login`: Sign in, store the session and recover the vault passphrase
//! - `sync`: Run one reconciliation cycle
//! - `watch`: Keep the vault in sync until interrupted
//! - `passphrase`: Set or rotate the vault passphrase
//! - `status`: Show configuration and sync state
//! - `purge`: Delete a file on the remote store
//!
//! ## Example
//!
//! ```bash
//! # Sign in and choose the vault folder
//! vaultsync login --server https://sync.example.com/api --username alice --vault ~/notes
//!
//! # Enable end-to-end encryption
//! vaultsync passphrase
//!
//! # Sync once, or keep syncing
//! vaultsync sync
//! vaultsync watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultsync_core::SyncMode;

mod commands;
mod config;

use commands::{login, passphrase, purge, status, sync, watch};

/// Keep a local vault in sync with a remote store.
#[derive(Parser, Debug)]
#[command(name = "vaultsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for configuration and sync state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and store the session
    Login {
        /// Server base URL
        #[arg(long)]
        server: Option<String>,

        /// Account name
        #[arg(long, short)]
        username: Option<String>,

        /// Local vault folder
        #[arg(long)]
        vault: Option<PathBuf>,
    },

    /// Run one sync cycle
    Sync {
        /// Override the configured direction (bidirectional, push, pull)
        #[arg(long)]
        mode: Option<SyncMode>,
    },

    /// Watch the vault and sync on changes until Ctrl-C
    Watch,

    /// Set or change the vault passphrase
    Passphrase,

    /// Show sync status
    Status,

    /// Delete a file on the remote store
    Purge {
        /// Remote file id
        file_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Login {
            server,
            username,
            vault,
        } => {
            login::run(&data_dir, server, username, vault).await?;
        }
        Commands::Sync { mode } => {
            sync::run(&data_dir, mode).await?;
        }
        Commands::Watch => {
            watch::run(&data_dir).await?;
        }
        Commands::Passphrase => {
            passphrase::run(&data_dir).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
        Commands::Purge { file_id } => {
            purge::run(&data_dir, &file_id).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for vaultsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "vaultsync", "vaultsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
