//! Run one sync cycle.

use anyhow::{Context, Result};
use std::path::Path;
use vaultsync_client::CycleSummary;
use vaultsync_core::{SyncMode, Trigger};

use super::{open_engine, save_session, CliEngine};
use crate::config::Config;

/// Run the sync command.
pub async fn run(data_dir: &Path, mode: Option<SyncMode>) -> Result<()> {
    let mut config = Config::load(data_dir).await?;
    if let Some(mode) = mode {
        config.mode = mode;
    }

    let engine = open_engine(data_dir, &config).await?;
    println!(
        "Syncing {} ({})...",
        config.vault_path()?.display(),
        config.mode
    );
    let summary = sync_once(&engine).await?;
    print_summary(&summary);

    Ok(())
}

/// One manual cycle; the session is saved whatever the outcome.
pub async fn sync_once(engine: &CliEngine) -> Result<CycleSummary> {
    let result = engine.run_cycle(Trigger::Manual).await;
    save_session(engine).await?;
    result
        .context("Sync failed")?
        .context("Sync was skipped")
}

/// Print a cycle summary with one line per failed file.
pub fn print_summary(summary: &CycleSummary) {
    println!("Sync complete: {}", summary);
    if summary.wipe_guard_tripped {
        println!();
        println!("Most tracked files are missing locally; they were restored");
        println!("from the server instead of being deleted there.");
    }
    if !summary.errors.is_empty() {
        println!();
        println!("Failed:");
        for error in &summary.errors {
            println!("  {}", error);
        }
    }
}
