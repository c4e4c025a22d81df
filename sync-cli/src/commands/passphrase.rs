//! Set or change the vault passphrase.

use anyhow::{Context, Result};
use std::path::Path;
use vaultsync_client::CycleSummary;

use super::sync::print_summary;
use super::{open_engine, save_session, CliEngine};
use crate::config::Config;

/// Run the passphrase command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let config = Config::load(data_dir).await?;
    let username = config.username()?.to_string();

    let passphrase =
        rpassword::prompt_password("New vault passphrase: ").context("Failed to read passphrase")?;
    if passphrase.is_empty() {
        anyhow::bail!("The passphrase must not be empty");
    }
    let confirm =
        rpassword::prompt_password("Repeat passphrase: ").context("Failed to read passphrase")?;
    if passphrase != confirm {
        anyhow::bail!("Passphrases do not match");
    }
    let password = rpassword::prompt_password(format!("Account password for {}: ", username))
        .context("Failed to read password")?;

    let engine = open_engine(data_dir, &config).await?;
    println!("Re-encrypting vault under the new passphrase...");
    let summary = rotate(&engine, &passphrase, &username, &password).await?;
    print_summary(&summary);
    println!();
    println!("Other devices pick up the new passphrase on their next 'vaultsync login'.");

    Ok(())
}

/// Rotate the passphrase; the session is saved whatever the outcome.
pub async fn rotate(
    engine: &CliEngine,
    passphrase: &str,
    username: &str,
    password: &str,
) -> Result<CycleSummary> {
    let result = engine
        .rotate_passphrase(passphrase, username, password)
        .await;
    save_session(engine).await?;
    result.context("Passphrase change failed")
}
