//! Request and response bodies of the remote store contract.
//!
//! All bodies are JSON. File payloads travel base64-encoded inside JSON
//! rather than as raw POST bodies so that proxies which rewrite or block
//! non-JSON requests leave them alone.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DeviceId, FileId, ManifestEntry, SyncError};

/// `POST delta` request: the local manifest plus locally deleted paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRequest {
    /// Every included local file.
    pub files: Vec<ManifestEntry>,
    /// Paths removed locally since the last successful cycle.
    pub deleted_paths: Vec<String>,
}

/// `POST delta` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaResponse {
    /// Actions to perform, in execution order.
    pub instructions: Vec<SyncInstruction>,
    /// Server clock in epoch seconds.
    #[serde(default)]
    pub server_time: Option<u64>,
    /// The account's authoritative encryption salt, if one is set.
    #[serde(default)]
    pub encryption_salt: Option<String>,
}

/// Action tag of a [`SyncInstruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Send the local file to the remote store.
    Upload,
    /// Fetch the remote file into the local vault.
    Download,
    /// Remove the local file (deletion already recorded remotely).
    Delete,
    /// Both sides changed independently.
    Conflict,
}

/// One instruction as it appears on the wire.
///
/// Convert to [`Instruction`] before acting on it; the conversion checks that
/// the fields each action needs are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInstruction {
    /// Target path.
    pub path: String,
    /// What to do.
    pub action: SyncAction,
    /// Remote file identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,
    /// Plaintext hash recorded remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_hash: Option<String>,
    /// Remote modification time in epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_modified_at: Option<u64>,
}

/// A remote file version referenced by a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteVersion {
    /// Remote file identifier.
    pub file_id: FileId,
    /// Plaintext hash recorded remotely.
    pub hash: Option<String>,
    /// Remote modification time in epoch seconds.
    pub modified_at: Option<u64>,
}

/// A validated instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Send the local file.
    Upload {
        /// Target path.
        path: String,
    },
    /// Fetch the remote file.
    Download {
        /// Target path.
        path: String,
        /// Remote file to fetch.
        file_id: FileId,
        /// Plaintext hash recorded remotely.
        remote_hash: Option<String>,
    },
    /// Remove the local file.
    Delete {
        /// Target path.
        path: String,
    },
    /// Resolve a concurrent modification.
    Conflict {
        /// Target path.
        path: String,
        /// The remote head, if the server still holds one.
        remote: Option<RemoteVersion>,
    },
}

impl Instruction {
    /// Path this instruction targets.
    pub fn path(&self) -> &str {
        match self {
            Self::Upload { path }
            | Self::Download { path, .. }
            | Self::Delete { path }
            | Self::Conflict { path, .. } => path,
        }
    }

    /// The wire action tag.
    pub fn action(&self) -> SyncAction {
        match self {
            Self::Upload { .. } => SyncAction::Upload,
            Self::Download { .. } => SyncAction::Download,
            Self::Delete { .. } => SyncAction::Delete,
            Self::Conflict { .. } => SyncAction::Conflict,
        }
    }
}

impl TryFrom<SyncInstruction> for Instruction {
    type Error = SyncError;

    fn try_from(wire: SyncInstruction) -> Result<Self, Self::Error> {
        let SyncInstruction {
            path,
            action,
            file_id,
            remote_hash,
            remote_modified_at,
        } = wire;

        if path.is_empty() {
            return Err(SyncError::InvalidInstruction {
                path,
                reason: "empty path",
            });
        }

        match action {
            SyncAction::Upload => Ok(Self::Upload { path }),
            SyncAction::Delete => Ok(Self::Delete { path }),
            SyncAction::Download => match file_id {
                Some(file_id) => Ok(Self::Download {
                    path,
                    file_id,
                    remote_hash,
                }),
                None => Err(SyncError::InvalidInstruction {
                    path,
                    reason: "download without file_id",
                }),
            },
            SyncAction::Conflict => Ok(Self::Conflict {
                path,
                remote: file_id.map(|file_id| RemoteVersion {
                    file_id,
                    hash: remote_hash,
                    modified_at: remote_modified_at,
                }),
            }),
        }
    }
}

/// `POST upload` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Target path.
    pub path: String,
    /// Base64 of the payload (ciphertext when encryption is active).
    pub data: String,
    /// Plaintext hash of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl UploadRequest {
    /// Build a request, base64-encoding the payload.
    pub fn new(path: impl Into<String>, payload: &[u8], hash: Option<String>) -> Self {
        Self {
            path: path.into(),
            data: STANDARD.encode(payload),
            hash,
        }
    }

    /// Decode the base64 payload.
    pub fn decode_data(&self) -> Result<Vec<u8>, SyncError> {
        STANDARD
            .decode(&self.data)
            .map_err(SyncError::InvalidPayload)
    }
}

/// `POST upload` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Identifier of the stored version.
    pub file_id: FileId,
    /// Server-side version number.
    pub version: u64,
}

/// `POST fix-hash` request: correct a stale recorded hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixHashRequest {
    /// Remote file to correct.
    pub file_id: FileId,
    /// The correct plaintext hash.
    pub hash: String,
}

/// `POST complete` request: marks the end of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// Reporting device.
    pub device_id: DeviceId,
}

/// `POST complete` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// Server-side vault version after the cycle.
    pub server_version: u64,
}

/// `PUT auth/encryption-salt` request.
///
/// Accepted unconditionally with `force`, otherwise only when the account has
/// no salt yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSaltRequest {
    /// Hex-encoded salt.
    pub salt: String,
    /// Overwrite an existing salt.
    #[serde(default)]
    pub force: bool,
}

/// Body of both vault key endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultKeyBody {
    /// Base64 wrapped passphrase; `None` when the account has none.
    #[serde(default)]
    pub blob: Option<String>,
}

/// `POST auth/login` request.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// `POST auth/refresh` request.
#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    /// Long-lived refresh token.
    pub refresh_token: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshRequest { refresh_token: [REDACTED] }")
    }
}

/// Token pair returned by login and refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { access_token: [REDACTED], refresh_token: [REDACTED] }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(action: SyncAction, file_id: Option<&str>) -> SyncInstruction {
        SyncInstruction {
            path: "a.md".into(),
            action,
            file_id: file_id.map(FileId::from),
            remote_hash: Some("h".into()),
            remote_modified_at: Some(10),
        }
    }

    // ===========================================
    // Instruction Conversion Tests
    // ===========================================

    #[test]
    fn delta_response_parses_server_json() {
        let body = json!({
            "instructions": [
                {"path": "a.md", "action": "download", "file_id": "f1"},
                {"path": "b.md", "action": "upload"}
            ],
            "server_time": 1_700_000_000u64,
            "encryption_salt": null
        });
        let resp: DeltaResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.instructions.len(), 2);
        assert_eq!(resp.instructions[0].action, SyncAction::Download);
        assert_eq!(resp.encryption_salt, None);
    }

    #[test]
    fn download_requires_file_id() {
        let err = Instruction::try_from(wire(SyncAction::Download, None)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidInstruction { .. }));

        let ok = Instruction::try_from(wire(SyncAction::Download, Some("f1"))).unwrap();
        assert!(matches!(ok, Instruction::Download { ref file_id, .. } if file_id.as_str() == "f1"));
    }

    #[test]
    fn conflict_without_file_id_has_no_remote() {
        let inst = Instruction::try_from(wire(SyncAction::Conflict, None)).unwrap();
        assert_eq!(
            inst,
            Instruction::Conflict {
                path: "a.md".into(),
                remote: None
            }
        );
    }

    #[test]
    fn conflict_with_file_id_carries_remote_version() {
        let inst = Instruction::try_from(wire(SyncAction::Conflict, Some("f9"))).unwrap();
        match inst {
            Instruction::Conflict {
                remote: Some(remote),
                ..
            } => {
                assert_eq!(remote.file_id.as_str(), "f9");
                assert_eq!(remote.hash.as_deref(), Some("h"));
                assert_eq!(remote.modified_at, Some(10));
            }
            other => panic!("expected conflict with remote, got {:?}", other),
        }
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut w = wire(SyncAction::Upload, None);
        w.path.clear();
        assert!(Instruction::try_from(w).is_err());
    }

    #[test]
    fn instruction_reports_path_and_action() {
        let inst = Instruction::Delete { path: "x/y.md".into() };
        assert_eq!(inst.path(), "x/y.md");
        assert_eq!(inst.action(), SyncAction::Delete);
    }

    // ===========================================
    // Upload Body Tests
    // ===========================================

    #[test]
    fn upload_request_base64_encodes_payload() {
        let req = UploadRequest::new("a.md", b"\x00\xffbinary", Some("h".into()));
        assert_eq!(req.decode_data().unwrap(), b"\x00\xffbinary");

        let json = serde_json::to_value(&req).unwrap();
        assert!(json["data"].is_string());
    }

    #[test]
    fn upload_request_omits_missing_hash() {
        let req = UploadRequest::new("a.md", b"x", None);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("hash").is_none());
    }

    #[test]
    fn salt_request_force_defaults_false() {
        let req: EncryptionSaltRequest = serde_json::from_value(json!({"salt": "ab"})).unwrap();
        assert!(!req.force);
    }

    // ===========================================
    // Debug Redaction Tests
    // ===========================================

    #[test]
    fn credentials_are_redacted_in_debug() {
        let login = LoginRequest {
            username: "alice".into(),
            password: "hunter2".into(),
        };
        let tokens = TokenPair {
            access_token: "acc-secret".into(),
            refresh_token: "ref-secret".into(),
        };
        let debug = format!("{:?} {:?}", login, tokens);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("acc-secret"));
        assert!(!debug.contains("ref-secret"));
    }
}
