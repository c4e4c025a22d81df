//! Remote store abstraction.
//!
//! The remote store owns version history and computes deltas. This client
//! only consumes its request/response contract:
//! - [`HttpRemote`] speaks JSON over HTTPS with a bearer token
//! - [`MockRemote`] computes real deltas in memory for tests
//!
//! # Example
//!
//! ```ignore
//! let remote = HttpRemote::new("https://sync.example.com")?;
//! remote.login("alice", "password").await?;
//! let delta = remote.delta(&DeltaRequest { files, deleted_paths }).await?;
//! ```

mod http;
mod mock;

pub use http::HttpRemote;
pub use mock::{MockRemote, RemoteCall, RemoteOp};

use async_trait::async_trait;
use thiserror::Error;
use vaultsync_core::is_terminal_status;
use vaultsync_types::{
    CompleteRequest, CompleteResponse, DeltaRequest, DeltaResponse, EncryptionSaltRequest, FileId,
    FixHashRequest, UploadRequest, UploadResponse,
};

/// Remote store errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (DNS, TLS, reset, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// No session; log in first.
    #[error("not logged in")]
    NotAuthenticated,
}

impl RemoteError {
    /// Whether another attempt could succeed. Terminal statuses (401, 403,
    /// 404, 413) and a missing session are not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Decode(_) => true,
            Self::Status { status, .. } => !is_terminal_status(*status),
            Self::NotAuthenticated => false,
        }
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The remote store contract.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `POST delta`: exchange the manifest for instructions.
    async fn delta(&self, request: &DeltaRequest) -> Result<DeltaResponse, RemoteError>;

    /// `POST upload`: store a new version of a file.
    async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse, RemoteError>;

    /// `GET download/{file_id}`: raw payload bytes.
    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>, RemoteError>;

    /// `DELETE delete/{file_id}`: explicit remote deletion. Never called by
    /// a reconciliation cycle.
    async fn delete(&self, file_id: &FileId) -> Result<(), RemoteError>;

    /// `POST fix-hash`: correct a stale recorded hash.
    async fn fix_hash(&self, request: &FixHashRequest) -> Result<(), RemoteError>;

    /// `POST complete`: mark a cycle complete.
    async fn complete(&self, request: &CompleteRequest) -> Result<CompleteResponse, RemoteError>;

    /// `PUT auth/encryption-salt`. Returns false when the server kept an
    /// existing salt (first writer wins unless `force`).
    async fn put_encryption_salt(&self, request: &EncryptionSaltRequest)
        -> Result<bool, RemoteError>;

    /// `PUT auth/vault-key`: store the wrapped passphrase.
    async fn put_vault_key(&self, blob: &str) -> Result<(), RemoteError>;

    /// `GET auth/vault-key`: the wrapped passphrase, if any.
    async fn get_vault_key(&self) -> Result<Option<String>, RemoteError>;
}
