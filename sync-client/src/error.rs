//! Cycle-level errors.

use thiserror::Error;
use vaultsync_core::PatternError;

use crate::crypto::CryptoError;
use crate::remote::RemoteError;
use crate::state::StateError;
use crate::store::StoreError;

/// Errors that abort a whole operation. Per-instruction failures are not
/// errors at this level; they are collected in the cycle summary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A manual sync was requested while another cycle is running.
    #[error("a sync is already in progress")]
    SyncInProgress,

    /// Local vault could not be enumerated.
    #[error("local vault error: {0}")]
    Store(#[from] StoreError),

    /// Remote call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Key derivation or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// An exclude pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The operation needs encryption to be configured.
    #[error("no vault passphrase is set")]
    NoPassphrase,
}
