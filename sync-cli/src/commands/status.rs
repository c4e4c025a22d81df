//! Show sync status.

use anyhow::{Context, Result};
use std::path::Path;
use vaultsync_client::{JsonStateStore, StateStore};

use crate::config::{state_path, Config};

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== vaultsync status ===");
    println!();

    let config = Config::load(data_dir).await?;
    let (Some(server), Some(vault)) = (&config.server_url, &config.vault_path) else {
        println!("Account: NOT CONFIGURED");
        println!();
        println!("Run 'vaultsync login --server <url> --username <name> --vault <path>'.");
        return Ok(());
    };

    println!("Account:");
    println!("  Server:   {}", server);
    println!("  Username: {}", config.username.as_deref().unwrap_or("-"));
    println!("  Vault:    {}", vault.display());
    println!("  Mode:     {}", config.mode);
    println!("  Schedule: {:?}", config.schedule.policy());
    println!(
        "  Realtime: {}",
        if config.schedule.realtime { "on" } else { "off" }
    );
    if !config.exclude.is_empty() {
        println!("  Exclude:  {}", config.exclude.join(", "));
    }
    println!();

    let state = JsonStateStore::new(state_path(data_dir))
        .load()
        .await
        .context("Failed to read sync state")?;
    let Some(state) = state else {
        println!("Sync: NEVER RUN");
        println!();
        println!("Run 'vaultsync login' to start.");
        return Ok(());
    };

    println!("Sync:");
    println!("  Device:     {}", state.device_id);
    println!("  Session:    {}", if state.tokens.is_some() { "active" } else { "logged out" });
    println!("  Encryption: {}", if state.passphrase.is_some() { "on" } else { "off" });
    if state.cursor.last_sync_time == 0 {
        println!("  Last sync:  never");
    } else {
        println!(
            "  Last sync:  {}",
            format_timestamp(state.cursor.last_sync_time)
        );
    }
    println!("  Tracked:    {} files", state.cursor.last_synced_paths.len());

    Ok(())
}

/// Format a Unix timestamp as a human-readable string.
fn format_timestamp(ts: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let diff = now.saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
