//! Delta reconciliation: manifest out, planned actions back.

use vaultsync_core::{plan, DeletionPlan, PlannedAction, SyncCursor, SyncMode};
use vaultsync_types::{
    DeltaRequest, EncryptionSaltRequest, Instruction, ManifestEntry, SyncAction,
};

use crate::keys::KeyManager;
use crate::remote::{RemoteError, RemoteStore};

/// An instruction the server sent that could not be acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedInstruction {
    /// Target path.
    pub path: String,
    /// Wire action.
    pub action: SyncAction,
    /// Why it was rejected.
    pub reason: String,
}

/// Result of one delta exchange.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Actions for the executor, in server order.
    pub actions: Vec<PlannedAction>,
    /// Instructions the sync mode ignores.
    pub skipped: usize,
    /// Malformed instructions.
    pub rejected: Vec<RejectedInstruction>,
    /// The account's authoritative salt, if the server has one.
    pub server_salt: Option<String>,
    /// Server clock.
    pub server_time: Option<u64>,
    /// Whether local deletions were withheld by the wipe guard.
    pub wipe_guard_tripped: bool,
}

/// Send the manifest with inferred deletions and plan the answer under `mode`.
///
/// Pull mode never reports local deletions; the server offers those files
/// back as downloads instead.
pub async fn reconcile<R: RemoteStore + ?Sized>(
    remote: &R,
    entries: Vec<ManifestEntry>,
    cursor: &SyncCursor,
    mode: SyncMode,
) -> Result<Reconciliation, RemoteError> {
    let (deleted_paths, wipe_guard_tripped) = if mode == SyncMode::Pull {
        (Vec::new(), false)
    } else {
        match cursor.plan_deletions(entries.iter().map(|e| e.path.as_str())) {
            DeletionPlan::Report(paths) => (paths, false),
            DeletionPlan::Suppressed { missing, tracked } => {
                tracing::warn!(
                    "Wipe guard: {} of {} tracked files are missing; not reporting deletions",
                    missing,
                    tracked
                );
                (Vec::new(), true)
            }
        }
    };

    if !deleted_paths.is_empty() {
        tracing::info!("Reporting {} local deletions", deleted_paths.len());
    }

    let response = remote
        .delta(&DeltaRequest {
            files: entries,
            deleted_paths,
        })
        .await?;

    let mut result = Reconciliation {
        server_salt: response.encryption_salt.filter(|s| !s.is_empty()),
        server_time: response.server_time,
        wipe_guard_tripped,
        ..Default::default()
    };

    for wire in response.instructions {
        let path = wire.path.clone();
        let action = wire.action;
        let instruction = match Instruction::try_from(wire) {
            Ok(instruction) => instruction,
            Err(e) => {
                tracing::warn!("Rejected {:?} instruction for {}: {}", action, path, e);
                result.rejected.push(RejectedInstruction {
                    path,
                    action,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        match plan(instruction, mode) {
            Some(planned) => result.actions.push(planned),
            None => {
                tracing::debug!("Skipping {:?} for {} in {} mode", action, path, mode);
                result.skipped += 1;
            }
        }
    }

    Ok(result)
}

/// Outcome of salt reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaltOutcome {
    /// Nothing to do.
    Unchanged,
    /// Adopted a different server salt.
    Adopted,
    /// This device set the account salt.
    Published,
    /// Another device set the salt first; ask for a fresh delta.
    LostRace,
}

/// Bring the local salt in line with the server before any payload is
/// encrypted or decrypted.
pub async fn reconcile_salt<R: RemoteStore + ?Sized>(
    keys: &mut KeyManager,
    remote: &R,
    server_salt: Option<&str>,
) -> Result<SaltOutcome, crate::EngineError> {
    if let Some(salt) = server_salt {
        if keys.adopt_salt(salt) {
            tracing::info!("Adopted account encryption salt from server");
            return Ok(SaltOutcome::Adopted);
        }
        return Ok(SaltOutcome::Unchanged);
    }

    if keys.context().passphrase().is_none() {
        return Ok(SaltOutcome::Unchanged);
    }

    let salt = keys.ensure_salt()?;
    let accepted = remote
        .put_encryption_salt(&EncryptionSaltRequest { salt, force: false })
        .await?;
    if accepted {
        tracing::info!("Published account encryption salt");
        Ok(SaltOutcome::Published)
    } else {
        tracing::warn!("Another device set the account salt first; waiting for its salt");
        Ok(SaltOutcome::LostRace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Argon2Params;
    use crate::keys::EncryptionContext;
    use crate::remote::{MockRemote, RemoteCall};
    use vaultsync_types::{FileId, SyncInstruction};

    fn entry(path: &str) -> ManifestEntry {
        ManifestEntry {
            path: path.into(),
            hash: format!("h-{path}"),
            size: 1,
            modified_at: 1,
        }
    }

    fn cursor(paths: &[&str]) -> SyncCursor {
        let mut c = SyncCursor::new();
        c.advance(10, paths.iter().copied());
        c
    }

    fn last_deleted(remote: &MockRemote) -> Vec<String> {
        remote
            .calls()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                RemoteCall::Delta { deleted_paths, .. } => Some(deleted_paths),
                _ => None,
            })
            .unwrap()
    }

    // ===========================================
    // Deletion Reporting Tests
    // ===========================================

    #[tokio::test]
    async fn minority_deletion_is_reported() {
        let remote = MockRemote::new();
        let c = cursor(&["a.md", "b.md", "c.md"]);
        let r = reconcile(&remote, vec![entry("a.md"), entry("b.md")], &c, SyncMode::default())
            .await
            .unwrap();
        assert!(!r.wipe_guard_tripped);
        assert_eq!(last_deleted(&remote), vec!["c.md".to_string()]);
    }

    #[tokio::test]
    async fn mass_deletion_trips_wipe_guard() {
        let remote = MockRemote::new();
        let c = cursor(&["a.md", "b.md", "c.md"]);
        let r = reconcile(&remote, vec![entry("a.md")], &c, SyncMode::default())
            .await
            .unwrap();
        assert!(r.wipe_guard_tripped);
        assert!(last_deleted(&remote).is_empty());
    }

    #[tokio::test]
    async fn pull_mode_reports_no_deletions() {
        let remote = MockRemote::new();
        let c = cursor(&["a.md", "b.md", "c.md"]);
        let r = reconcile(&remote, vec![entry("a.md"), entry("b.md")], &c, SyncMode::Pull)
            .await
            .unwrap();
        assert!(!r.wipe_guard_tripped);
        assert!(last_deleted(&remote).is_empty());

        reconcile(&remote, vec![entry("a.md"), entry("b.md")], &c, SyncMode::Push)
            .await
            .unwrap();
        assert_eq!(last_deleted(&remote), vec!["c.md".to_string()]);
    }

    // ===========================================
    // Planning Tests
    // ===========================================

    #[tokio::test]
    async fn mode_filters_and_counts_skipped() {
        let remote = MockRemote::new();
        remote.script_delta(vec![
            SyncInstruction {
                path: "up.md".into(),
                action: SyncAction::Upload,
                file_id: None,
                remote_hash: None,
                remote_modified_at: None,
            },
            SyncInstruction {
                path: "down.md".into(),
                action: SyncAction::Download,
                file_id: Some(FileId::from("f1")),
                remote_hash: None,
                remote_modified_at: None,
            },
        ]);
        let r = reconcile(&remote, vec![], &SyncCursor::new(), SyncMode::Push)
            .await
            .unwrap();
        assert_eq!(r.actions, vec![PlannedAction::Upload { path: "up.md".into() }]);
        assert_eq!(r.skipped, 1);
    }

    #[tokio::test]
    async fn malformed_download_is_rejected() {
        let remote = MockRemote::new();
        remote.script_delta(vec![SyncInstruction {
            path: "x.md".into(),
            action: SyncAction::Download,
            file_id: None,
            remote_hash: None,
            remote_modified_at: None,
        }]);
        let r = reconcile(&remote, vec![], &SyncCursor::new(), SyncMode::default())
            .await
            .unwrap();
        assert!(r.actions.is_empty());
        assert_eq!(r.rejected.len(), 1);
        assert_eq!(r.rejected[0].action, SyncAction::Download);
    }

    // ===========================================
    // Salt Reconciliation Tests
    // ===========================================

    fn keys(passphrase: Option<&str>, salt: Option<&str>) -> KeyManager {
        KeyManager::with_context(
            Argon2Params::insecure_fast(),
            EncryptionContext::new(passphrase.map(String::from), salt.map(String::from)),
        )
    }

    #[tokio::test]
    async fn server_salt_is_adopted() {
        let remote = MockRemote::new();
        let mut km = keys(Some("p"), Some("local-salt-0000"));
        let out = reconcile_salt(&mut km, &remote, Some("server-salt-0000"))
            .await
            .unwrap();
        assert_eq!(out, SaltOutcome::Adopted);
        assert_eq!(km.context().salt(), Some("server-salt-0000"));

        let again = reconcile_salt(&mut km, &remote, Some("server-salt-0000"))
            .await
            .unwrap();
        assert_eq!(again, SaltOutcome::Unchanged);
    }

    #[tokio::test]
    async fn first_device_publishes_salt() {
        let remote = MockRemote::new();
        let mut km = keys(Some("p"), None);
        let out = reconcile_salt(&mut km, &remote, None).await.unwrap();
        assert_eq!(out, SaltOutcome::Published);
        assert_eq!(remote.salt().as_deref(), km.context().salt());
        assert!(remote
            .calls()
            .contains(&RemoteCall::PutSalt {
                salt: km.context().salt().unwrap().to_string(),
                force: false
            }));
    }

    #[tokio::test]
    async fn lost_race_is_tolerated() {
        let remote = MockRemote::new();
        remote.set_salt("winner-salt-000");
        let mut km = keys(Some("p"), Some("loser-salt-0000"));
        let out = reconcile_salt(&mut km, &remote, None).await.unwrap();
        assert_eq!(out, SaltOutcome::LostRace);
        assert_eq!(remote.salt().as_deref(), Some("winner-salt-000"));
    }

    #[tokio::test]
    async fn no_passphrase_means_no_salt_push() {
        let remote = MockRemote::new();
        let mut km = keys(None, None);
        let out = reconcile_salt(&mut km, &remote, None).await.unwrap();
        assert_eq!(out, SaltOutcome::Unchanged);
        assert!(remote.calls().is_empty());
    }
}
