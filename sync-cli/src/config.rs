//! Configuration management for vaultsync.
//!
//! Settings live in `config.toml` inside the data directory; engine state
//! (device id, cursor, session, passphrase) lives next to it in
//! `state.json` and is managed by the client library.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vaultsync_client::{Argon2Params, SyncSettings};
use vaultsync_core::schedule::{DEFAULT_DEBOUNCE, DEFAULT_INTERVAL, DEFAULT_REALTIME_DEBOUNCE};
use vaultsync_core::{SchedulePolicy, SyncMode};

const CONFIG_FILE: &str = "config.toml";
const STATE_FILE: &str = "state.json";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote store base URL, e.g. `https://sync.example.com/api`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Local vault root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_path: Option<PathBuf>,
    /// Account name, needed to derive the account key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Sync direction.
    #[serde(default)]
    pub mode: SyncMode,
    /// Extra exclusion patterns.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Automatic sync triggers.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Key derivation cost.
    #[serde(default)]
    pub kdf: KdfConfig,
}

/// Which automatic trigger drives watch mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Manual and real-time triggers only.
    Disabled,
    /// Sync after a quiet period following local changes.
    #[default]
    Debounced,
    /// Sync on a fixed period while there are unsynced changes.
    Interval,
}

/// Schedule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Trigger policy (default: debounced).
    #[serde(default)]
    pub policy: PolicyKind,
    /// Quiet period after local changes (default: 5s).
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Interval period (default: 5 minutes).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Listen for remote change notifications (default: true).
    #[serde(default = "default_realtime")]
    pub realtime: bool,
    /// Quiet period after remote notifications (default: 2s).
    #[serde(default = "default_realtime_debounce_secs")]
    pub realtime_debounce_secs: u64,
}

/// Argon2id cost for vault and account keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdfConfig {
    /// Memory cost in MiB (default: 19).
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,
    /// Iterations (default: 2).
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

// Default value functions
fn default_debounce_secs() -> u64 {
    DEFAULT_DEBOUNCE.as_secs()
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL.as_secs()
}

fn default_realtime() -> bool {
    true
}

fn default_realtime_debounce_secs() -> u64 {
    DEFAULT_REALTIME_DEBOUNCE.as_secs()
}

fn default_memory_mib() -> u32 {
    Argon2Params::DEFAULT.memory_mib()
}

fn default_iterations() -> u32 {
    Argon2Params::DEFAULT.iterations()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            debounce_secs: default_debounce_secs(),
            interval_secs: default_interval_secs(),
            realtime: default_realtime(),
            realtime_debounce_secs: default_realtime_debounce_secs(),
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            memory_mib: default_memory_mib(),
            iterations: default_iterations(),
        }
    }
}

impl ScheduleConfig {
    /// The engine-side policy.
    pub fn policy(&self) -> SchedulePolicy {
        match self.policy {
            PolicyKind::Disabled => SchedulePolicy::Disabled,
            PolicyKind::Debounced => SchedulePolicy::Debounced {
                quiet: Duration::from_secs(self.debounce_secs),
            },
            PolicyKind::Interval => SchedulePolicy::Interval {
                period: Duration::from_secs(self.interval_secs.max(1)),
            },
        }
    }

    /// Quiet period applied to remote notifications.
    pub fn realtime_debounce(&self) -> Duration {
        Duration::from_secs(self.realtime_debounce_secs)
    }
}

impl KdfConfig {
    /// Argon2id parameters (single lane).
    pub fn params(&self) -> Argon2Params {
        Argon2Params::new(self.memory_mib, self.iterations, 1)
    }
}

impl Config {
    /// Load `config.toml` from the data directory; defaults when absent.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Invalid configuration in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Save configuration to the data directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let contents = toml::to_string_pretty(self).context("Failed to encode configuration")?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Server URL, or an error telling the user to log in.
    pub fn server_url(&self) -> Result<&str> {
        self.server_url
            .as_deref()
            .context("No server configured. Run 'vaultsync login' first.")
    }

    /// Vault root, or an error telling the user to log in.
    pub fn vault_path(&self) -> Result<&Path> {
        self.vault_path
            .as_deref()
            .context("No vault configured. Run 'vaultsync login --vault <path>' first.")
    }

    /// Account name, or an error telling the user to log in.
    pub fn username(&self) -> Result<&str> {
        self.username
            .as_deref()
            .context("No username configured. Run 'vaultsync login' first.")
    }

    /// Engine settings for this configuration.
    pub fn settings(&self) -> SyncSettings {
        SyncSettings::default()
            .with_mode(self.mode)
            .with_exclude(self.exclude.iter().cloned())
            .with_argon2(self.kdf.params())
    }
}

/// Location of the engine state file.
pub fn state_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STATE_FILE)
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.mode, SyncMode::Bidirectional);
        assert_eq!(config.schedule.policy, PolicyKind::Debounced);
        assert!(config.schedule.realtime);
        assert_eq!(config.kdf.params(), Argon2Params::new(19, 2, 1));
        assert!(config.server_url().is_err());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
server_url = "https://sync.example.com/api"
vault_path = "/home/alice/notes"
username = "alice"
mode = "pull"
exclude = ["drafts/", "*.tmp"]

[schedule]
policy = "interval"
interval_secs = 60
realtime = false

[kdf]
memory_mib = 64
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server_url().unwrap(), "https://sync.example.com/api");
        assert_eq!(config.vault_path().unwrap(), Path::new("/home/alice/notes"));
        assert_eq!(config.mode, SyncMode::Pull);
        assert_eq!(config.exclude.len(), 2);
        assert_eq!(
            config.schedule.policy(),
            SchedulePolicy::Interval {
                period: Duration::from_secs(60)
            }
        );
        assert!(!config.schedule.realtime);
        assert_eq!(config.kdf.memory_mib, 64);
        assert_eq!(config.kdf.iterations, 2);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: Config = toml::from_str("[schedule]\n").unwrap();
        assert_eq!(config.schedule.debounce_secs, 5);
        assert_eq!(config.schedule.realtime_debounce_secs, 2);
        assert_eq!(
            config.schedule.policy(),
            SchedulePolicy::Debounced {
                quiet: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(toml::from_str::<Config>("mode = \"sideways\"").is_err());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let config = Config {
            server_url: Some("http://localhost:8080".into()),
            username: Some("alice".into()),
            mode: SyncMode::Push,
            ..Config::default()
        };
        config.save(dir.path()).await.unwrap();

        let loaded = Config::load(dir.path()).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        Config::default().save(dir.path()).await.unwrap();

        let path = dir.path().join(CONFIG_FILE);
        let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
