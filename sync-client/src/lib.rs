//! # vaultsync-client
//!
//! Client library for vaultsync: keeps a local vault consistent with a
//! remote store across devices, with optional end-to-end encryption.
//!
//! ## Features
//!
//! - **Content-Addressed Deltas**: SHA-256 manifests with a stat-keyed hash cache
//! - **Wipe Guard**: mass local disappearances are never propagated as deletions
//! - **E2E Encryption**: XChaCha20-Poly1305 under an Argon2id vault key
//! - **Key Distribution**: the passphrase travels wrapped under an account key
//! - **Cursor Safety**: a failed download keeps the cursor so the next cycle retries
//! - **Pluggable I/O**: vault store, remote store and state store are traits
//!
//! ## Example
//!
//! ```ignore
//! use vaultsync_client::{FsVaultStore, HttpRemote, JsonStateStore, SyncEngine, SyncSettings};
//! use vaultsync_core::Trigger;
//!
//! let remote = HttpRemote::new("https://sync.example.com")?;
//! remote.login("alice", "password").await?;
//! let engine = SyncEngine::open(
//!     FsVaultStore::new("/home/alice/notes"),
//!     remote,
//!     JsonStateStore::new("/home/alice/.local/share/vaultsync/state.json"),
//!     SyncSettings::default(),
//! )
//! .await?;
//! let summary = engine.run_cycle(Trigger::Manual).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod engine;
mod error;
pub mod executor;
pub mod keys;
pub mod manifest;
pub mod realtime;
pub mod reconcile;
pub mod remote;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod store;

pub use crypto::{AccountKey, Argon2Params, CryptoError, VaultKey};
pub use engine::{EngineStatus, SyncEngine, SyncSettings};
pub use error::EngineError;
pub use executor::{CycleSummary, InstructionError};
pub use keys::{EncryptionContext, KeyManager};
pub use manifest::{build_manifest, content_hash, HashCache};
pub use realtime::{realtime_url, RealtimeChannel, RealtimeError};
pub use remote::{HttpRemote, MockRemote, RemoteCall, RemoteError, RemoteOp, RemoteStore};
pub use scheduler::{Coordinator, CoordinatorInput, DebounceTimer};
pub use state::{JsonStateStore, MemoryStateStore, StateError, StateStore, SyncState};
pub use store::{FileMeta, FsVaultStore, MemoryVaultStore, StoreError, VaultStore};
