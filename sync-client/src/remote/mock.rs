//! Mock remote store for testing.
//!
//! Keeps file versions in memory and computes real deltas, so repeated
//! cycles converge the way they would against a server. Failures can be
//! queued per operation and every call is recorded for verification.
//!
//! Clones share everything. [`MockRemote::another_device`] shares the stored
//! files but tracks what a second device has seen.

use super::{RemoteError, RemoteStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use vaultsync_types::{
    CompleteRequest, CompleteResponse, DeltaRequest, DeltaResponse, EncryptionSaltRequest, FileId,
    FixHashRequest, SyncAction, SyncInstruction, UploadRequest, UploadResponse,
};

/// Operation names for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `POST delta`
    Delta,
    /// `POST upload`
    Upload,
    /// `GET download/{id}`
    Download,
    /// `DELETE delete/{id}`
    Delete,
    /// `POST fix-hash`
    FixHash,
    /// `POST complete`
    Complete,
    /// `PUT auth/encryption-salt`
    PutSalt,
    /// `PUT auth/vault-key`
    PutVaultKey,
    /// `GET auth/vault-key`
    GetVaultKey,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// Delta with the manifest size and reported deletions.
    Delta {
        /// Number of manifest entries.
        files: usize,
        /// Reported local deletions.
        deleted_paths: Vec<String>,
    },
    /// Upload of a path.
    Upload {
        /// Target path.
        path: String,
        /// Plaintext hash sent along.
        hash: Option<String>,
    },
    /// Download of a file id.
    Download {
        /// Requested file.
        file_id: FileId,
    },
    /// Explicit remote delete.
    Delete {
        /// Deleted file.
        file_id: FileId,
    },
    /// Hash correction.
    FixHash {
        /// Corrected file.
        file_id: FileId,
        /// New hash.
        hash: String,
    },
    /// Cycle completion.
    Complete,
    /// Salt push.
    PutSalt {
        /// Pushed salt.
        salt: String,
        /// Overwrite requested.
        force: bool,
    },
    /// Wrapped passphrase push.
    PutVaultKey,
    /// Wrapped passphrase fetch.
    GetVaultKey,
}

impl RemoteCall {
    /// Operation of this call.
    pub fn op(&self) -> RemoteOp {
        match self {
            Self::Delta { .. } => RemoteOp::Delta,
            Self::Upload { .. } => RemoteOp::Upload,
            Self::Download { .. } => RemoteOp::Download,
            Self::Delete { .. } => RemoteOp::Delete,
            Self::FixHash { .. } => RemoteOp::FixHash,
            Self::Complete => RemoteOp::Complete,
            Self::PutSalt { .. } => RemoteOp::PutSalt,
            Self::PutVaultKey => RemoteOp::PutVaultKey,
            Self::GetVaultKey => RemoteOp::GetVaultKey,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Network,
    Status(u16),
}

impl Failure {
    fn to_error(self) -> RemoteError {
        match self {
            Self::Network => RemoteError::Network("injected failure".into()),
            Self::Status(status) => RemoteError::Status {
                status,
                message: "injected failure".into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    file_id: FileId,
    payload: Vec<u8>,
    hash: Option<String>,
    modified_at: u64,
}

#[derive(Debug, Default)]
struct SharedState {
    files: BTreeMap<String, StoredFile>,
    tombstones: BTreeSet<String>,
    next_id: u64,
    version: u64,
    salt: Option<String>,
    vault_key: Option<String>,
    calls: Vec<RemoteCall>,
    fail_next: HashMap<RemoteOp, VecDeque<Failure>>,
    fail_always: HashMap<RemoteOp, Failure>,
    scripted: VecDeque<Vec<SyncInstruction>>,
}

/// Hashes this device and the server last agreed on, by path.
#[derive(Debug, Default)]
struct DeviceView {
    base: HashMap<String, String>,
}

/// Mock remote store for testing.
#[derive(Debug, Default, Clone)]
pub struct MockRemote {
    shared: Arc<Mutex<SharedState>>,
    device: Arc<Mutex<DeviceView>>,
}

impl MockRemote {
    /// Create an empty remote store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the same stored files for a different device.
    pub fn another_device(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            device: Arc::default(),
        }
    }

    /// Store a file as if another device had uploaded it.
    pub fn seed_file(&self, path: &str, payload: impl Into<Vec<u8>>, hash: Option<&str>) -> FileId {
        let mut shared = self.shared.lock().unwrap();
        store_file(&mut shared, path, payload.into(), hash.map(String::from))
    }

    /// Remove a file as if another device had deleted it.
    pub fn remove_file(&self, path: &str) {
        let mut shared = self.shared.lock().unwrap();
        if shared.files.remove(path).is_some() {
            shared.tombstones.insert(path.to_string());
        }
    }

    /// Stored payload and recorded hash of a path.
    pub fn file(&self, path: &str) -> Option<(FileId, Vec<u8>, Option<String>)> {
        let shared = self.shared.lock().unwrap();
        shared
            .files
            .get(path)
            .map(|f| (f.file_id.clone(), f.payload.clone(), f.hash.clone()))
    }

    /// Sorted stored paths.
    pub fn paths(&self) -> Vec<String> {
        let shared = self.shared.lock().unwrap();
        shared.files.keys().cloned().collect()
    }

    /// The account salt.
    pub fn salt(&self) -> Option<String> {
        self.shared.lock().unwrap().salt.clone()
    }

    /// Set the account salt directly.
    pub fn set_salt(&self, salt: &str) {
        self.shared.lock().unwrap().salt = Some(salt.to_string());
    }

    /// The stored wrapped passphrase.
    pub fn vault_key_blob(&self) -> Option<String> {
        self.shared.lock().unwrap().vault_key.clone()
    }

    /// Set the wrapped passphrase directly.
    pub fn set_vault_key_blob(&self, blob: &str) {
        self.shared.lock().unwrap().vault_key = Some(blob.to_string());
    }

    /// Answer the next delta with these instructions instead of computing.
    pub fn script_delta(&self, instructions: Vec<SyncInstruction>) {
        let mut shared = self.shared.lock().unwrap();
        shared.scripted.push_back(instructions);
    }

    /// Fail the next call of `op` with an HTTP status.
    pub fn fail_next(&self, op: RemoteOp, status: u16) {
        let mut shared = self.shared.lock().unwrap();
        shared
            .fail_next
            .entry(op)
            .or_default()
            .push_back(Failure::Status(status));
    }

    /// Fail the next call of `op` with a transport error.
    pub fn fail_next_network(&self, op: RemoteOp) {
        let mut shared = self.shared.lock().unwrap();
        shared
            .fail_next
            .entry(op)
            .or_default()
            .push_back(Failure::Network);
    }

    /// Fail every call of `op` with an HTTP status.
    pub fn fail_always(&self, op: RemoteOp, status: u16) {
        let mut shared = self.shared.lock().unwrap();
        shared.fail_always.insert(op, Failure::Status(status));
    }

    /// Stop failing `op`.
    pub fn clear_failures(&self, op: RemoteOp) {
        let mut shared = self.shared.lock().unwrap();
        shared.fail_always.remove(&op);
        shared.fail_next.remove(&op);
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.shared.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: RemoteOp) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.calls.iter().filter(|c| c.op() == op).count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.shared.lock().unwrap().calls.clear();
    }

    /// Record the call and apply any injected failure.
    fn enter(&self, call: RemoteCall) -> Result<std::sync::MutexGuard<'_, SharedState>, RemoteError> {
        let mut shared = self.shared.lock().unwrap();
        let op = call.op();
        shared.calls.push(call);
        if let Some(failure) = shared.fail_next.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(failure.to_error());
        }
        if let Some(failure) = shared.fail_always.get(&op) {
            return Err(failure.to_error());
        }
        Ok(shared)
    }
}

fn store_file(shared: &mut SharedState, path: &str, payload: Vec<u8>, hash: Option<String>) -> FileId {
    shared.next_id += 1;
    shared.version += 1;
    let file_id = FileId::new(format!("f{}", shared.next_id));
    shared.tombstones.remove(path);
    shared.files.insert(
        path.to_string(),
        StoredFile {
            file_id: file_id.clone(),
            payload,
            hash,
            modified_at: shared.version,
        },
    );
    file_id
}

fn instruction(path: &str, action: SyncAction, file: Option<&StoredFile>) -> SyncInstruction {
    SyncInstruction {
        path: path.to_string(),
        action,
        file_id: file.map(|f| f.file_id.clone()),
        remote_hash: file.and_then(|f| f.hash.clone()),
        remote_modified_at: file.map(|f| f.modified_at),
    }
}

/// Three-way comparison of local manifest, stored files and the device's
/// last agreed hashes.
fn compute_delta(
    shared: &mut SharedState,
    device: &mut DeviceView,
    request: &DeltaRequest,
) -> Vec<SyncInstruction> {
    let mut out = Vec::new();

    for path in &request.deleted_paths {
        if let Some(file) = shared.files.get(path) {
            let unchanged_remotely = device.base.get(path) == file.hash.as_ref();
            if unchanged_remotely {
                shared.files.remove(path);
                shared.tombstones.insert(path.clone());
                shared.version += 1;
            }
        }
        device.base.remove(path);
    }

    let local: BTreeMap<&str, &str> = request
        .files
        .iter()
        .map(|e| (e.path.as_str(), e.hash.as_str()))
        .collect();

    for (&path, &local_hash) in &local {
        let base = device.base.get(path).map(String::as_str);
        match shared.files.get(path) {
            None if shared.tombstones.contains(path) && base == Some(local_hash) => {
                out.push(instruction(path, SyncAction::Delete, None));
                device.base.remove(path);
            }
            None => out.push(instruction(path, SyncAction::Upload, None)),
            Some(file) => {
                let remote_hash = file.hash.as_deref();
                if remote_hash == Some(local_hash) {
                    device.base.insert(path.to_string(), local_hash.to_string());
                } else if base == Some(local_hash) {
                    out.push(instruction(path, SyncAction::Download, Some(file)));
                } else if base.is_some() && base == remote_hash {
                    out.push(instruction(path, SyncAction::Upload, None));
                } else {
                    out.push(instruction(path, SyncAction::Conflict, Some(file)));
                }
            }
        }
    }

    for (path, file) in &shared.files {
        if !local.contains_key(path.as_str()) && !request.deleted_paths.contains(path) {
            out.push(instruction(path, SyncAction::Download, Some(file)));
        }
    }

    out
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn delta(&self, request: &DeltaRequest) -> Result<DeltaResponse, RemoteError> {
        let mut shared = self.enter(RemoteCall::Delta {
            files: request.files.len(),
            deleted_paths: request.deleted_paths.clone(),
        })?;
        let instructions = match shared.scripted.pop_front() {
            Some(scripted) => scripted,
            None => {
                let mut device = self.device.lock().unwrap();
                compute_delta(&mut shared, &mut device, request)
            }
        };
        Ok(DeltaResponse {
            instructions,
            server_time: Some(shared.version),
            encryption_salt: shared.salt.clone(),
        })
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse, RemoteError> {
        let mut shared = self.enter(RemoteCall::Upload {
            path: request.path.clone(),
            hash: request.hash.clone(),
        })?;
        let payload = request
            .decode_data()
            .map_err(|e| RemoteError::Status {
                status: 400,
                message: e.to_string(),
            })?;
        let file_id = store_file(&mut shared, &request.path, payload, request.hash.clone());
        if let Some(hash) = &request.hash {
            let mut device = self.device.lock().unwrap();
            device.base.insert(request.path.clone(), hash.clone());
        }
        Ok(UploadResponse {
            file_id,
            version: shared.version,
        })
    }

    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>, RemoteError> {
        let shared = self.enter(RemoteCall::Download {
            file_id: file_id.clone(),
        })?;
        shared
            .files
            .values()
            .find(|f| &f.file_id == file_id)
            .map(|f| f.payload.clone())
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("no file {}", file_id),
            })
    }

    async fn delete(&self, file_id: &FileId) -> Result<(), RemoteError> {
        let mut shared = self.enter(RemoteCall::Delete {
            file_id: file_id.clone(),
        })?;
        let path = shared
            .files
            .iter()
            .find(|(_, f)| &f.file_id == file_id)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                message: format!("no file {}", file_id),
            })?;
        shared.files.remove(&path);
        shared.tombstones.insert(path);
        shared.version += 1;
        Ok(())
    }

    async fn fix_hash(&self, request: &FixHashRequest) -> Result<(), RemoteError> {
        let mut shared = self.enter(RemoteCall::FixHash {
            file_id: request.file_id.clone(),
            hash: request.hash.clone(),
        })?;
        if let Some(file) = shared
            .files
            .values_mut()
            .find(|f| f.file_id == request.file_id)
        {
            file.hash = Some(request.hash.clone());
        }
        Ok(())
    }

    async fn complete(&self, _request: &CompleteRequest) -> Result<CompleteResponse, RemoteError> {
        let shared = self.enter(RemoteCall::Complete)?;
        Ok(CompleteResponse {
            server_version: shared.version,
        })
    }

    async fn put_encryption_salt(
        &self,
        request: &EncryptionSaltRequest,
    ) -> Result<bool, RemoteError> {
        let mut shared = self.enter(RemoteCall::PutSalt {
            salt: request.salt.clone(),
            force: request.force,
        })?;
        match &shared.salt {
            Some(existing) if !request.force && existing != &request.salt => Ok(false),
            _ => {
                shared.salt = Some(request.salt.clone());
                Ok(true)
            }
        }
    }

    async fn put_vault_key(&self, blob: &str) -> Result<(), RemoteError> {
        let mut shared = self.enter(RemoteCall::PutVaultKey)?;
        shared.vault_key = Some(blob.to_string());
        Ok(())
    }

    async fn get_vault_key(&self) -> Result<Option<String>, RemoteError> {
        let shared = self.enter(RemoteCall::GetVaultKey)?;
        Ok(shared.vault_key.clone())
    }
}
