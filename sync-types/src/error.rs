//! Error types for vaultsync wire handling.

use thiserror::Error;

/// Errors that can occur while encoding or interpreting wire data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Base64 payload could not be decoded
    #[error("invalid base64 payload: {0}")]
    InvalidPayload(#[source] base64::DecodeError),

    /// Instruction is missing a field its action requires
    #[error("invalid instruction for {path}: {reason}")]
    InvalidInstruction {
        /// Path the instruction targets.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
