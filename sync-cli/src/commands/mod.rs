//! CLI command implementations.

pub mod login;
pub mod passphrase;
pub mod purge;
pub mod status;
pub mod sync;
pub mod watch;

use anyhow::{Context, Result};
use std::path::Path;
use vaultsync_client::{FsVaultStore, HttpRemote, JsonStateStore, StateStore, SyncEngine};

use crate::config::{state_path, Config};

/// The engine as the CLI runs it.
pub type CliEngine = SyncEngine<FsVaultStore, HttpRemote, JsonStateStore>;

/// Open the engine for the configured vault, resuming the saved session.
pub async fn open_engine(data_dir: &Path, config: &Config) -> Result<CliEngine> {
    let server = config.server_url()?;
    let vault = config.vault_path()?;

    let state_store = JsonStateStore::new(state_path(data_dir));
    let tokens = state_store
        .load()
        .await
        .context("Failed to read sync state")?
        .and_then(|state| state.tokens)
        .context("Not logged in. Run 'vaultsync login' first.")?;
    let remote =
        HttpRemote::with_tokens(server, tokens).context("Failed to create HTTP client")?;

    SyncEngine::open(
        FsVaultStore::new(vault),
        remote,
        state_store,
        config.settings(),
    )
    .await
    .context("Failed to open sync engine")
}

/// Persist the session, which a token refresh may have replaced.
pub async fn save_session(engine: &CliEngine) -> Result<()> {
    let tokens = engine.remote().tokens().await;
    engine
        .set_session(tokens)
        .await
        .context("Failed to save session")
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_requires_login() {
        let dir = tempdir().unwrap();
        let config = Config {
            server_url: Some("http://127.0.0.1:9".into()),
            vault_path: Some(dir.path().join("vault")),
            ..Config::default()
        };

        let err = open_engine(dir.path(), &config).await.err().unwrap();
        assert!(err.to_string().contains("Not logged in"), "got: {}", err);
    }

    #[tokio::test]
    async fn open_requires_server() {
        let dir = tempdir().unwrap();
        let err = open_engine(dir.path(), &Config::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("No server configured"), "got: {}", err);
    }

    #[tokio::test]
    async fn open_resumes_session() {
        let dir = tempdir().unwrap();
        let config = testing::logged_in(dir.path(), "http://127.0.0.1:9").await;

        let engine = open_engine(dir.path(), &config).await.unwrap();
        let tokens = engine.remote().tokens().await.unwrap();
        assert_eq!(tokens.access_token, "a1");
    }
}
