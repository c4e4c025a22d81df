//! Persisted engine state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use vaultsync_core::SyncCursor;
use vaultsync_types::{DeviceId, TokenPair};

/// State persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the state file failed.
    #[error("state i/o error on {path}: {source}")]
    Io {
        /// State file.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },

    /// The state file is not valid JSON.
    #[error("invalid state file: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Everything the engine keeps between runs.
#[derive(Clone, Serialize, Deserialize)]
pub struct SyncState {
    /// This installation's identity.
    pub device_id: DeviceId,
    /// Last successful cycle.
    #[serde(default)]
    pub cursor: SyncCursor,
    /// Vault passphrase, if encryption is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Account encryption salt (hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    /// Remote session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
}

impl SyncState {
    /// Fresh state for a new installation.
    pub fn new() -> Self {
        Self {
            device_id: DeviceId::random(),
            cursor: SyncCursor::new(),
            passphrase: None,
            salt: None,
            tokens: None,
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncState")
            .field("device_id", &self.device_id)
            .field("last_sync_time", &self.cursor.last_sync_time)
            .field("tracked_paths", &self.cursor.last_synced_paths.len())
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("salt", &self.salt)
            .field("tokens", &self.tokens.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Where the engine persists [`SyncState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load saved state, `None` on first run.
    async fn load(&self) -> Result<Option<SyncState>, StateError>;

    /// Replace saved state.
    async fn save(&self, state: &SyncState) -> Result<(), StateError>;
}

/// JSON file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    /// Persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// State file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<Option<SyncState>, StateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io(e)),
        }
    }

    async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io(e))?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| self.io(e))?;
        set_file_permissions_0600(&tmp).await.map_err(|e| self.io(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io(e))
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// In-memory state store for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<MemoryStateInner>>,
}

#[derive(Debug, Default)]
struct MemoryStateInner {
    state: Option<SyncState>,
    saves: usize,
}

impl MemoryStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds `state`.
    pub fn with_state(state: SyncState) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().state = Some(state);
        store
    }

    /// Last saved state.
    pub fn state(&self) -> Option<SyncState> {
        self.inner.lock().unwrap().state.clone()
    }

    /// Number of `save()` calls.
    pub fn saves(&self) -> usize {
        self.inner.lock().unwrap().saves
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<SyncState>, StateError> {
        Ok(self.state())
    }

    async fn save(&self, state: &SyncState) -> Result<(), StateError> {
        let mut inner = self.inner.lock().unwrap();
        inner.state = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("nested/state.json"));
        let mut state = SyncState::new();
        state.cursor.advance(42, ["a.md", "b.md"]);
        state.salt = Some("abcd".into());
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.device_id, state.device_id);
        assert_eq!(loaded.cursor, state.cursor);
        assert_eq!(loaded.salt.as_deref(), Some("abcd"));
        assert!(loaded.passphrase.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = JsonStateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StateError::Invalid(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn state_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("state.json"));
        store.save(&SyncState::new()).await.unwrap();

        let perms = tokio::fs::metadata(store.path()).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut state = SyncState::new();
        state.passphrase = Some("hunter2".into());
        let debug = format!("{:?}", state);
        assert!(!debug.contains("hunter2"));
    }
}
