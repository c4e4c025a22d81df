//! Sign in and store the session.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use vaultsync_client::{FsVaultStore, HttpRemote, JsonStateStore, SyncEngine};

use crate::config::{state_path, Config};

/// Run the login command.
pub async fn run(
    data_dir: &Path,
    server: Option<String>,
    username: Option<String>,
    vault: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load(data_dir).await?;
    if let Some(server) = server {
        config.server_url = Some(server);
    }
    if let Some(username) = username {
        config.username = Some(username);
    }
    if let Some(vault) = vault {
        config.vault_path = Some(vault);
    }

    let username = config.username()?.to_string();
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;

    let encrypted = login(data_dir, &config, &password).await?;
    config.save(data_dir).await?;

    println!("Logged in as {}", username);
    println!();
    println!("  Server: {}", config.server_url()?);
    println!("  Vault:  {}", config.vault_path()?.display());
    if encrypted {
        println!("  Encryption: enabled (passphrase recovered)");
    } else {
        println!("  Encryption: off");
        println!();
        println!("Run 'vaultsync passphrase' to enable end-to-end encryption.");
    }

    Ok(())
}

/// Log in, persist the session and recover the vault passphrase.
///
/// Returns whether the account has encryption enabled.
pub async fn login(data_dir: &Path, config: &Config, password: &str) -> Result<bool> {
    let server = config.server_url()?;
    let username = config.username()?;
    let vault = config.vault_path()?;

    let remote = HttpRemote::new(server).context("Failed to create HTTP client")?;
    let tokens = remote
        .login(username, password)
        .await
        .context("Login failed")?;

    tokio::fs::create_dir_all(vault)
        .await
        .with_context(|| format!("Failed to create vault folder {}", vault.display()))?;
    let engine = SyncEngine::open(
        FsVaultStore::new(vault),
        remote,
        JsonStateStore::new(state_path(data_dir)),
        config.settings(),
    )
    .await
    .context("Failed to open sync engine")?;
    engine
        .set_session(Some(tokens))
        .await
        .context("Failed to save session")?;

    engine
        .recover_passphrase(username, password)
        .await
        .context("Failed to recover the vault passphrase")
}
