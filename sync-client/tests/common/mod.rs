//! Shared fixtures for engine scenarios.

#![allow(dead_code)]

use std::time::Duration;

use vaultsync_client::{
    Argon2Params, MemoryStateStore, MemoryVaultStore, MockRemote, SyncEngine, SyncSettings,
    SyncState,
};
use vaultsync_core::{RetryPolicy, SyncMode, Trigger};

pub type TestEngine = SyncEngine<MemoryVaultStore, MockRemote, MemoryStateStore>;

/// One simulated device: its vault, its view of the remote and its state.
pub struct Device {
    pub store: MemoryVaultStore,
    pub remote: MockRemote,
    pub state: MemoryStateStore,
    pub engine: TestEngine,
}

pub fn settings(mode: SyncMode) -> SyncSettings {
    SyncSettings::default()
        .with_mode(mode)
        .with_retry(RetryPolicy::new(3, Duration::ZERO))
        .with_argon2(Argon2Params::insecure_fast())
}

pub async fn device(remote: MockRemote) -> Device {
    device_with(remote, MemoryStateStore::new(), SyncMode::Bidirectional).await
}

pub async fn device_with(remote: MockRemote, state: MemoryStateStore, mode: SyncMode) -> Device {
    let store = MemoryVaultStore::new();
    let engine = SyncEngine::open(store.clone(), remote.clone(), state.clone(), settings(mode))
        .await
        .unwrap();
    Device {
        store,
        remote,
        state,
        engine,
    }
}

/// Device whose persisted state already carries a passphrase.
pub async fn device_with_passphrase(remote: MockRemote, passphrase: &str) -> Device {
    let mut state = SyncState::new();
    state.passphrase = Some(passphrase.to_string());
    device_with(remote, MemoryStateStore::with_state(state), SyncMode::Bidirectional).await
}

impl Device {
    pub async fn sync(&self) -> vaultsync_client::CycleSummary {
        self.engine
            .run_cycle(Trigger::Manual)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn cursor_time(&self) -> u64 {
        self.state.state().unwrap().cursor.last_sync_time
    }
}
