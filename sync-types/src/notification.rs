//! Messages pushed by the remote store over the real-time channel.

use serde::{Deserialize, Serialize};

use crate::SyncError;

/// A push notification from the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Another device changed a file; a reconciliation cycle should run.
    SyncUpdate {
        /// Server-side action that happened (upload, delete, ...).
        action: String,
        /// Affected path.
        file_path: String,
    },
    /// Any message type this client does not act on.
    #[serde(other)]
    Other,
}

impl Notification {
    /// Parse a text frame.
    pub fn from_json(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(SyncError::Deserialization)
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Whether this notification should request a reconciliation cycle.
    pub fn requests_sync(&self) -> bool {
        matches!(self, Self::SyncUpdate { .. })
    }
}
