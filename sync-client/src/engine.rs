//! The sync engine.
//!
//! [`SyncEngine`] ties the pieces together for one vault: it snapshots the
//! local tree, reconciles with the remote store, brings the encryption salt
//! in line, executes the answer and persists state once at the end.
//!
//! # Architecture
//!
//! ```text
//! Coordinator → SyncEngine → manifest → reconcile → Executor
//!                   ↓                        ↓           ↓
//!              StateStore               RemoteStore  VaultStore
//! ```
//!
//! # Example
//!
//! ```ignore
//! let engine = SyncEngine::open(
//!     FsVaultStore::new("/home/me/notes"),
//!     HttpRemote::new("https://sync.example.com")?,
//!     JsonStateStore::new(data_dir.join("state.json")),
//!     SyncSettings::default(),
//! )
//! .await?;
//! if let Some(summary) = engine.run_cycle(Trigger::Manual).await? {
//!     println!("{summary}");
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use vaultsync_core::{PathFilter, RetryPolicy, SyncMode, Trigger};
use vaultsync_types::{
    CompleteRequest, DeviceId, EncryptionSaltRequest, FileId, SyncAction, TokenPair,
};

use crate::crypto::{generate_salt, Argon2Params};
use crate::executor::{CycleSummary, Executor, InstructionError};
use crate::keys::{derive_account_key, EncryptionContext, KeyManager};
use crate::manifest::{build_manifest, HashCache};
use crate::reconcile::{reconcile, reconcile_salt, SaltOutcome};
use crate::remote::RemoteStore;
use crate::retry::with_retry;
use crate::state::{StateStore, SyncState};
use crate::store::VaultStore;
use crate::EngineError;

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    /// Sync direction.
    pub mode: SyncMode,
    /// User exclusion patterns.
    pub exclude: Vec<String>,
    /// Retry policy for uploads and conflict transfers.
    pub retry: RetryPolicy,
    /// Key derivation cost.
    pub argon2: Argon2Params,
}

impl SyncSettings {
    /// Set the sync mode.
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the exclusion patterns.
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the Argon2 parameters.
    pub fn with_argon2(mut self, params: Argon2Params) -> Self {
        self.argon2 = params;
        self
    }
}

/// Snapshot of the engine for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// This installation.
    pub device_id: DeviceId,
    /// Last successful cycle, epoch seconds (0 = never).
    pub last_sync_time: u64,
    /// Paths recorded by the cursor.
    pub tracked_paths: usize,
    /// Whether payloads are encrypted.
    pub encryption_active: bool,
    /// Account salt, if known.
    pub salt: Option<String>,
    /// Local changes not yet synced cleanly.
    pub dirty: bool,
    /// A cycle is running.
    pub in_progress: bool,
    /// Configured direction.
    pub mode: SyncMode,
}

struct EngineInner {
    cache: HashCache,
    keys: KeyManager,
    state: SyncState,
}

/// Clears the in-progress flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Client sync engine for one vault.
pub struct SyncEngine<S, R, P> {
    store: S,
    remote: R,
    state_store: P,
    settings: SyncSettings,
    filter: PathFilter,
    inner: Mutex<EngineInner>,
    in_progress: AtomicBool,
    dirty: AtomicBool,
}

impl<S, R, P> SyncEngine<S, R, P>
where
    S: VaultStore,
    R: RemoteStore,
    P: StateStore,
{
    /// Load persisted state (or start fresh) and build the engine.
    pub async fn open(store: S, remote: R, state_store: P, settings: SyncSettings) -> Result<Self, EngineError> {
        let filter = PathFilter::new(&settings.exclude)?;
        let state = match state_store.load().await? {
            Some(state) => state,
            None => {
                let state = SyncState::new();
                tracing::info!("New device {}", state.device_id);
                state_store.save(&state).await?;
                state
            }
        };
        let keys = KeyManager::with_context(
            settings.argon2,
            EncryptionContext::new(state.passphrase.clone(), state.salt.clone()),
        );

        Ok(Self {
            store,
            remote,
            state_store,
            settings,
            filter,
            inner: Mutex::new(EngineInner {
                cache: HashCache::new(),
                keys,
                state,
            }),
            in_progress: AtomicBool::new(false),
            // Unknown local history; let the first interval tick run.
            dirty: AtomicBool::new(true),
        })
    }

    /// The remote store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The local vault store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Engine settings.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Whether a cycle is running.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Whether local changes are waiting for a clean cycle.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Record an observed local mutation. Returns false when the change
    /// was ignored because a cycle is in flight.
    pub fn note_local_change(&self) -> bool {
        if self.is_in_progress() {
            tracing::debug!("Local change during a cycle ignored");
            return false;
        }
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Run one reconciliation cycle.
    ///
    /// Returns `Ok(None)` when the trigger was dropped: an automatic trigger
    /// while another cycle runs, or an interval tick on a clean vault.
    pub async fn run_cycle(&self, trigger: Trigger) -> Result<Option<CycleSummary>, EngineError> {
        let Some(_guard) = InFlight::acquire(&self.in_progress) else {
            if trigger.is_manual() {
                return Err(EngineError::SyncInProgress);
            }
            tracing::debug!("{:?} trigger dropped; a cycle is already running", trigger);
            return Ok(None);
        };
        if !trigger.should_run(self.is_dirty()) {
            tracing::debug!("{:?} trigger skipped; nothing changed", trigger);
            return Ok(None);
        }

        tracing::info!("Sync started ({:?}, {} mode)", trigger, self.settings.mode);
        let mut inner = self.inner.lock().await;
        let summary = self.cycle(&mut inner, self.settings.mode).await?;
        if summary.is_clean() {
            self.dirty.store(false, Ordering::Release);
        }
        tracing::info!("Sync finished: {}", summary);
        Ok(Some(summary))
    }

    async fn cycle(&self, inner: &mut EngineInner, mode: SyncMode) -> Result<CycleSummary, EngineError> {
        let entries = build_manifest(&self.store, &self.filter, &mut inner.cache).await?;

        let mut reconciliation =
            reconcile(&self.remote, entries.clone(), &inner.state.cursor, mode).await?;
        let outcome = reconcile_salt(
            &mut inner.keys,
            &self.remote,
            reconciliation.server_salt.as_deref(),
        )
        .await?;
        if outcome == SaltOutcome::LostRace {
            reconciliation = reconcile(&self.remote, entries, &inner.state.cursor, mode).await?;
            reconcile_salt(
                &mut inner.keys,
                &self.remote,
                reconciliation.server_salt.as_deref(),
            )
            .await?;
        }
        inner.state.salt = inner.keys.context().salt().map(String::from);

        let key = inner.keys.vault_key().await?;
        let executor = Executor::new(&self.store, &self.remote, key, self.settings.retry);
        let mut summary = executor.run(reconciliation.actions).await;
        summary.skipped = reconciliation.skipped;
        summary.wipe_guard_tripped = reconciliation.wipe_guard_tripped;
        for rejected in reconciliation.rejected {
            summary.push_error(InstructionError {
                path: rejected.path,
                action: rejected.action,
                download_class: true,
                message: rejected.reason,
            });
        }

        if summary.download_failures == 0 {
            let present: Vec<String> = self
                .store
                .list_files()
                .await?
                .into_iter()
                .map(|meta| meta.path)
                .filter(|path| !self.filter.is_excluded(path))
                .collect();
            inner.state.cursor.advance(now_secs(), present);
            summary.cursor_advanced = true;

            let complete = CompleteRequest {
                device_id: inner.state.device_id,
            };
            match self.remote.complete(&complete).await {
                Ok(response) => {
                    tracing::debug!("Cycle complete at server version {}", response.server_version)
                }
                Err(e) => tracing::warn!("Could not mark cycle complete: {}", e),
            }
        } else {
            tracing::warn!(
                "{} download failures; keeping the previous cursor",
                summary.download_failures
            );
        }

        self.state_store.save(&inner.state).await?;
        Ok(summary)
    }

    /// Set or change the vault passphrase.
    ///
    /// A fresh salt is generated and forced onto the account, the new
    /// passphrase is wrapped under the account key and published, every
    /// local file is re-uploaded under the new key and a normal cycle runs.
    ///
    /// Local keys, cursor and state change only once both the salt and the
    /// wrapped passphrase are on the server. If the wrapped passphrase is
    /// rejected the previous salt is pushed back.
    pub async fn rotate_passphrase(
        &self,
        passphrase: &str,
        username: &str,
        password: &str,
    ) -> Result<CycleSummary, EngineError> {
        let Some(_guard) = InFlight::acquire(&self.in_progress) else {
            return Err(EngineError::SyncInProgress);
        };
        if passphrase.is_empty() {
            return Err(EngineError::NoPassphrase);
        }

        let mut inner = self.inner.lock().await;
        let salt = generate_salt()?;
        let staged = EncryptionContext::new(Some(passphrase.to_string()), Some(salt.clone()));
        let account = derive_account_key(password, username, self.settings.argon2).await?;
        let blob = account.wrap_passphrase(passphrase)?;

        let request = EncryptionSaltRequest { salt, force: true };
        with_retry(&self.settings.retry, "publish salt", || {
            self.remote.put_encryption_salt(&request)
        })
        .await?;

        if let Err(e) = with_retry(&self.settings.retry, "publish vault key", || {
            self.remote.put_vault_key(&blob)
        })
        .await
        {
            self.restore_salt(inner.keys.context().salt()).await;
            return Err(e.into());
        }

        inner.keys.install(staged);
        inner.state.cursor.mark_stale();
        inner.state.passphrase = Some(passphrase.to_string());
        inner.state.salt = Some(request.salt.clone());
        self.state_store.save(&inner.state).await?;
        tracing::info!("Passphrase rotated; re-uploading vault");

        let key = inner.keys.vault_key().await?;
        let entries = build_manifest(&self.store, &self.filter, &mut inner.cache).await?;
        let executor = Executor::new(&self.store, &self.remote, key, self.settings.retry);
        let mut reupload = CycleSummary::default();
        for entry in &entries {
            match executor.upload(&entry.path).await {
                Ok(()) => reupload.uploaded += 1,
                Err(e) => {
                    tracing::warn!("Re-upload of {} failed: {}", entry.path, e);
                    reupload.push_error(InstructionError {
                        path: entry.path.clone(),
                        action: SyncAction::Upload,
                        download_class: false,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut summary = self.cycle(&mut inner, SyncMode::Bidirectional).await?;
        summary.merge(reupload);
        if summary.is_clean() {
            self.dirty.store(false, Ordering::Release);
        }
        tracing::info!("Rotation finished: {}", summary);
        Ok(summary)
    }

    /// Put the pre-rotation salt back after a half-finished rotation.
    async fn restore_salt(&self, previous: Option<&str>) {
        let Some(salt) = previous else {
            tracing::warn!("Passphrase not published; the account keeps the new salt");
            return;
        };
        let request = EncryptionSaltRequest {
            salt: salt.to_string(),
            force: true,
        };
        match with_retry(&self.settings.retry, "restore salt", || {
            self.remote.put_encryption_salt(&request)
        })
        .await
        {
            Ok(_) => tracing::info!("Passphrase not published; previous salt restored"),
            Err(e) => tracing::warn!("Could not restore the previous salt: {}", e),
        }
    }

    /// Fetch the wrapped passphrase and unwrap it with the account key.
    ///
    /// Returns false when the account has no vault key (encryption is not
    /// enabled). A wrong password and a corrupt blob both surface as
    /// [`crate::CryptoError::AuthenticationFailed`].
    pub async fn recover_passphrase(&self, username: &str, password: &str) -> Result<bool, EngineError> {
        let blob = with_retry(&self.settings.retry, "fetch vault key", || {
            self.remote.get_vault_key()
        })
        .await?;
        let Some(blob) = blob else {
            tracing::info!("No vault key on the account; encryption is off");
            return Ok(false);
        };

        let account = derive_account_key(password, username, self.settings.argon2).await?;
        let passphrase = account.unwrap_passphrase(&blob)?;

        let mut inner = self.inner.lock().await;
        inner.keys.set_passphrase(Some(passphrase.clone()));
        inner.state.passphrase = Some(passphrase);
        self.state_store.save(&inner.state).await?;
        tracing::info!("Vault passphrase recovered");
        Ok(true)
    }

    /// Explicitly delete a file on the remote store.
    pub async fn purge(&self, file_id: &FileId) -> Result<(), EngineError> {
        with_retry(&self.settings.retry, "delete", || self.remote.delete(file_id)).await?;
        tracing::info!("Deleted remote file {}", file_id);
        Ok(())
    }

    /// Persist a new remote session (or clear it).
    pub async fn set_session(&self, tokens: Option<TokenPair>) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        inner.state.tokens = tokens;
        self.state_store.save(&inner.state).await?;
        Ok(())
    }

    /// The persisted remote session.
    pub async fn session(&self) -> Option<TokenPair> {
        self.inner.lock().await.state.tokens.clone()
    }

    /// Current engine status.
    pub async fn status(&self) -> EngineStatus {
        let inner = self.inner.lock().await;
        EngineStatus {
            device_id: inner.state.device_id,
            last_sync_time: inner.state.cursor.last_sync_time,
            tracked_paths: inner.state.cursor.last_synced_paths.len(),
            encryption_active: inner.keys.is_active(),
            salt: inner.keys.context().salt().map(String::from),
            dirty: self.is_dirty(),
            in_progress: self.is_in_progress(),
            mode: self.settings.mode,
        }
    }
}

fn now_secs() -> u64 {
    let secs = chrono::Utc::now().timestamp();
    u64::try_from(secs).unwrap_or(0).max(1)
}
