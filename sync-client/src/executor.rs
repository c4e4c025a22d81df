//! Instruction executor.
//!
//! Applies planned actions in server order. Each action succeeds or fails on
//! its own; only the counters in [`CycleSummary`] are shared between them.
//!
//! Failures are classified as download-class (download, delete and the fetch
//! leg of a conflict) or not. Any download-class failure keeps the cursor
//! from advancing so the next cycle retries; upload failures do not.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use vaultsync_core::{conflict_copy_path, PlannedAction, RetryPolicy};
use vaultsync_types::{FileId, FixHashRequest, RemoteVersion, SyncAction, UploadRequest};

use crate::crypto::{CryptoError, VaultKey};
use crate::manifest::content_hash;
use crate::remote::{RemoteError, RemoteStore};
use crate::retry::with_retry;
use crate::store::{parent_dir, StoreError, VaultStore};

/// One instruction that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionError {
    /// Target path.
    pub path: String,
    /// Wire action the instruction came from.
    pub action: SyncAction,
    /// Whether this failure blocks the cursor.
    pub download_class: bool,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for InstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.action, self.path, self.message)
    }
}

/// Aggregate result of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Files sent to the remote store.
    pub uploaded: usize,
    /// Files written locally from the remote store.
    pub downloaded: usize,
    /// Downloads whose content already matched the local file.
    pub skipped_writes: usize,
    /// Local files removed.
    pub deleted: usize,
    /// Conflicts resolved.
    pub conflicted: usize,
    /// Instructions the sync mode ignored.
    pub skipped: usize,
    /// Failed instructions.
    pub errors: Vec<InstructionError>,
    /// How many of `errors` are download-class.
    pub download_failures: usize,
    /// Whether local deletions were withheld this cycle.
    pub wipe_guard_tripped: bool,
    /// Whether the cursor was persisted.
    pub cursor_advanced: bool,
}

impl CycleSummary {
    /// No instruction failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record a failure.
    pub fn push_error(&mut self, error: InstructionError) {
        if error.download_class {
            self.download_failures += 1;
        }
        self.errors.push(error);
    }

    /// Add another summary's counters and errors to this one.
    pub fn merge(&mut self, other: CycleSummary) {
        self.uploaded += other.uploaded;
        self.downloaded += other.downloaded;
        self.skipped_writes += other.skipped_writes;
        self.deleted += other.deleted;
        self.conflicted += other.conflicted;
        self.skipped += other.skipped;
        self.download_failures += other.download_failures;
        self.errors.extend(other.errors);
        self.wipe_guard_tripped |= other.wipe_guard_tripped;
        self.cursor_advanced |= other.cursor_advanced;
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded, {} downloaded, {} unchanged, {} deleted, {} conflicts, {} skipped, {} errors",
            self.uploaded,
            self.downloaded,
            self.skipped_writes,
            self.deleted,
            self.conflicted,
            self.skipped,
            self.errors.len()
        )?;
        if self.wipe_guard_tripped {
            f.write_str(" (deletions withheld)")?;
        }
        if !self.cursor_advanced {
            f.write_str(" (cursor not advanced)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// What a download did to the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Content was written.
    Written,
    /// Local content already matched; nothing written.
    Unchanged,
}

/// Applies planned actions against a vault store and a remote store.
pub struct Executor<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    remote: &'a R,
    key: Option<Arc<VaultKey>>,
    retry: RetryPolicy,
}

impl<'a, S, R> Executor<'a, S, R>
where
    S: VaultStore + ?Sized,
    R: RemoteStore + ?Sized,
{
    /// Executor that encrypts with `key` when present.
    pub fn new(store: &'a S, remote: &'a R, key: Option<Arc<VaultKey>>, retry: RetryPolicy) -> Self {
        Self {
            store,
            remote,
            key,
            retry,
        }
    }

    /// Apply every action in order and tally the results.
    pub async fn run(&self, actions: Vec<PlannedAction>) -> CycleSummary {
        let mut summary = CycleSummary::default();
        for action in actions {
            self.apply(action, &mut summary).await;
        }
        summary
    }

    async fn apply(&self, action: PlannedAction, summary: &mut CycleSummary) {
        match action {
            PlannedAction::Upload { path } => {
                self.upload_counted(&path, SyncAction::Upload, summary).await;
            }
            PlannedAction::Download { path, file_id } => {
                match self.download(&path, &file_id, false).await {
                    Ok(outcome) => count_download(outcome, summary),
                    Err(e) => summary.push_error(failure(&path, SyncAction::Download, true, e)),
                }
            }
            PlannedAction::Delete { path } => match self.delete(&path).await {
                Ok(true) => summary.deleted += 1,
                Ok(false) => tracing::debug!("{} already absent", path),
                Err(e) => summary.push_error(failure(&path, SyncAction::Delete, true, e)),
            },
            PlannedAction::KeepBoth { path, remote } => {
                self.keep_both(&path, remote, summary).await;
            }
            PlannedAction::LocalWins { path } => {
                if self.upload_counted(&path, SyncAction::Conflict, summary).await {
                    summary.conflicted += 1;
                }
            }
            PlannedAction::ServerWins { path, file_id } => {
                match self.download(&path, &file_id, true).await {
                    Ok(outcome) => {
                        count_download(outcome, summary);
                        summary.conflicted += 1;
                    }
                    Err(e) => summary.push_error(failure(&path, SyncAction::Conflict, true, e)),
                }
            }
        }
    }

    async fn upload_counted(&self, path: &str, action: SyncAction, summary: &mut CycleSummary) -> bool {
        match self.upload(path).await {
            Ok(()) => {
                summary.uploaded += 1;
                true
            }
            Err(e) => {
                summary.push_error(failure(path, action, false, e));
                false
            }
        }
    }

    /// Read, hash, encrypt and send one file, with retry.
    pub async fn upload(&self, path: &str) -> Result<(), TransferError> {
        self.try_upload(path).await.map_err(TransferError)
    }

    async fn try_upload(&self, path: &str) -> Result<(), StepError> {
        let request = {
            let plaintext = self.store.read(path).await?;
            let hash = content_hash(&plaintext);
            let payload = match &self.key {
                Some(key) => key.encrypt(&plaintext)?,
                None => plaintext,
            };
            UploadRequest::new(path, &payload, Some(hash))
        };

        let response = with_retry(&self.retry, &format!("upload {path}"), || {
            self.remote.upload(&request)
        })
        .await?;
        tracing::debug!("Uploaded {} as {} (v{})", path, response.file_id, response.version);
        Ok(())
    }

    /// Fetch one file and write it unless the local copy already matches.
    pub async fn download(
        &self,
        path: &str,
        file_id: &FileId,
        retry: bool,
    ) -> Result<DownloadOutcome, TransferError> {
        self.try_download(path, file_id, retry)
            .await
            .map_err(TransferError)
    }

    async fn try_download(
        &self,
        path: &str,
        file_id: &FileId,
        retry: bool,
    ) -> Result<DownloadOutcome, StepError> {
        let plaintext = self.fetch(file_id, retry).await?;
        let hash = content_hash(&plaintext);

        if self.store.exists(path).await? {
            let local = self.store.read(path).await?;
            if content_hash(&local) == hash {
                tracing::debug!("{} already up to date", path);
                let fix = FixHashRequest {
                    file_id: file_id.clone(),
                    hash,
                };
                if let Err(e) = self.remote.fix_hash(&fix).await {
                    tracing::warn!("Could not correct recorded hash of {}: {}", path, e);
                }
                return Ok(DownloadOutcome::Unchanged);
            }
        }

        self.write(path, &plaintext).await?;
        tracing::debug!("Downloaded {}", path);
        Ok(DownloadOutcome::Written)
    }

    async fn fetch(&self, file_id: &FileId, retry: bool) -> Result<Vec<u8>, StepError> {
        let payload = if retry {
            with_retry(&self.retry, &format!("download {file_id}"), || {
                self.remote.download(file_id)
            })
            .await?
        } else {
            self.remote.download(file_id).await?
        };
        match &self.key {
            Some(key) => Ok(key.decrypt(&payload)?),
            None => Ok(payload),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<(), StepError> {
        if let Some(parent) = parent_dir(path) {
            self.store.create_dir_all(parent).await?;
        }
        self.store.write(path, data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool, StepError> {
        if !self.store.exists(path).await? {
            return Ok(false);
        }
        self.store.remove(path).await?;
        tracing::debug!("Deleted {}", path);
        Ok(true)
    }

    async fn keep_both(&self, path: &str, remote: Option<RemoteVersion>, summary: &mut CycleSummary) {
        let Some(remote) = remote else {
            tracing::debug!("Conflict on {} has no remote version; uploading", path);
            self.upload_counted(path, SyncAction::Conflict, summary).await;
            return;
        };

        match self.store.exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Conflict on {} with no local file; downloading", path);
                match self.download(path, &remote.file_id, false).await {
                    Ok(outcome) => count_download(outcome, summary),
                    Err(e) => summary.push_error(failure(path, SyncAction::Conflict, true, e)),
                }
                return;
            }
            Err(e) => {
                summary.push_error(failure(path, SyncAction::Conflict, true, StepError::from(e)));
                return;
            }
        }

        let copy = conflict_copy_path(path, Utc::now());
        let saved = async {
            let plaintext = self.fetch(&remote.file_id, true).await?;
            self.write(&copy, &plaintext).await
        }
        .await;
        if let Err(e) = saved {
            summary.push_error(failure(path, SyncAction::Conflict, true, e));
            return;
        }
        tracing::info!("Conflict on {}: remote version saved as {}", path, copy);
        summary.conflicted += 1;

        self.upload_counted(path, SyncAction::Conflict, summary).await;
    }
}

/// Error from a single upload or download leg.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TransferError(StepError);

impl TransferError {
    /// Whether the failure was a decryption failure.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.0, StepError::Crypto(CryptoError::AuthenticationFailed))
    }
}

fn count_download(outcome: DownloadOutcome, summary: &mut CycleSummary) {
    match outcome {
        DownloadOutcome::Written => summary.downloaded += 1,
        DownloadOutcome::Unchanged => summary.skipped_writes += 1,
    }
}

fn failure(path: &str, action: SyncAction, download_class: bool, error: impl fmt::Display) -> InstructionError {
    tracing::warn!("{:?} {} failed: {}", action, path, error);
    InstructionError {
        path: path.to_string(),
        action,
        download_class,
        message: error.to_string(),
    }
}
