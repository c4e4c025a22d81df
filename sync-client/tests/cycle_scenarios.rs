//! End-to-end reconciliation cycles against the in-memory remote store.
//!
//! Every scenario drives a real [`SyncEngine`] through `run_cycle`, with a
//! [`MockRemote`] that computes deltas the way a server would.

mod common;

use common::{device, device_with, settings, Device};
use vaultsync_client::{
    content_hash, MemoryStateStore, MockRemote, RemoteCall, RemoteOp, SyncEngine,
};
use vaultsync_core::{SyncMode, Trigger};
use vaultsync_types::{FileId, SyncAction, SyncInstruction};

fn scripted(path: &str, action: SyncAction, file_id: Option<FileId>) -> SyncInstruction {
    SyncInstruction {
        path: path.into(),
        action,
        file_id,
        remote_hash: None,
        remote_modified_at: None,
    }
}

async fn synced_device(paths: &[&str]) -> Device {
    let d = device(MockRemote::new()).await;
    for path in paths {
        d.store.insert(path, format!("content of {path}"));
    }
    let summary = d.sync().await;
    assert_eq!(summary.uploaded, paths.len());
    d
}

// ============================================================================
// Idempotence
// ============================================================================

/// A second cycle with no changes on either side does nothing.
#[tokio::test]
async fn unchanged_vault_converges() {
    let d = synced_device(&["a.md", "notes/b.md"]).await;

    let second = d.sync().await;
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.deleted, 0);
    assert!(second.is_clean());
    assert!(second.cursor_advanced);
    assert_eq!(d.remote.count(RemoteOp::Upload), 2);
}

/// Excluded, hidden and state paths never reach the remote store.
#[tokio::test]
async fn excluded_paths_are_not_uploaded() {
    let remote = MockRemote::new();
    let store = vaultsync_client::MemoryVaultStore::new();
    store.insert("a.md", "1");
    store.insert("drafts/x.md", "2");
    store.insert(".obsidian/app.json", "3");
    store.insert(".vaultsync/state.json", "4");
    let engine = vaultsync_client::SyncEngine::open(
        store.clone(),
        remote.clone(),
        MemoryStateStore::new(),
        common::settings(SyncMode::Bidirectional).with_exclude(["drafts/"]),
    )
    .await
    .unwrap();

    engine.run_cycle(Trigger::Manual).await.unwrap();
    assert_eq!(remote.paths(), vec!["a.md".to_string()]);
}

// ============================================================================
// Wipe Guard
// ============================================================================

/// Losing most of the vault restores it instead of deleting it remotely.
#[tokio::test]
async fn mass_local_loss_is_restored() {
    let d = synced_device(&["a.md", "b.md", "c.md", "d.md"]).await;
    for path in ["a.md", "b.md", "c.md"] {
        d.store.delete(path);
    }

    let summary = d.sync().await;
    assert!(summary.wipe_guard_tripped);
    assert_eq!(summary.downloaded, 3);
    assert_eq!(d.remote.paths().len(), 4);
    assert_eq!(d.store.paths().len(), 4);
    assert_eq!(d.store.get("a.md").unwrap(), b"content of a.md");
}

/// Deleting half of the tracked files is still an intentional cleanup.
#[tokio::test]
async fn half_deleted_is_reported() {
    let d = synced_device(&["a.md", "b.md", "c.md", "d.md"]).await;
    d.store.delete("a.md");
    d.store.delete("b.md");

    let summary = d.sync().await;
    assert!(!summary.wipe_guard_tripped);
    assert_eq!(d.remote.paths(), vec!["c.md".to_string(), "d.md".to_string()]);
    assert!(d.remote.calls().contains(&RemoteCall::Delta {
        files: 2,
        deleted_paths: vec!["a.md".into(), "b.md".into()],
    }));
}

/// A pull-only device never deletes on the server; the file comes back.
#[tokio::test]
async fn pull_mode_restores_local_deletion() {
    let d = synced_device(&["a.md", "b.md", "c.md", "d.md"]).await;
    let pull = SyncEngine::open(
        d.store.clone(),
        d.remote.clone(),
        d.state.clone(),
        settings(SyncMode::Pull),
    )
    .await
    .unwrap();
    d.store.delete("a.md");

    let summary = pull.run_cycle(Trigger::Manual).await.unwrap().unwrap();
    assert_eq!(summary.downloaded, 1);
    assert!(summary.cursor_advanced);
    assert_eq!(d.remote.paths().len(), 4);
    assert_eq!(d.store.get("a.md").unwrap(), b"content of a.md");
    assert!(d.remote.calls().contains(&RemoteCall::Delta {
        files: 3,
        deleted_paths: vec![],
    }));
}

/// Push mode still reports what was deleted locally.
#[tokio::test]
async fn push_mode_reports_local_deletion() {
    let d = synced_device(&["a.md", "b.md", "c.md", "d.md"]).await;
    let push = SyncEngine::open(
        d.store.clone(),
        d.remote.clone(),
        d.state.clone(),
        settings(SyncMode::Push),
    )
    .await
    .unwrap();
    d.store.delete("a.md");

    push.run_cycle(Trigger::Manual).await.unwrap().unwrap();
    assert_eq!(d.remote.paths(), vec!["b.md", "c.md", "d.md"]);
    assert!(d.store.get("a.md").is_none());
}

/// A deletion on one device removes the file on the other.
#[tokio::test]
async fn remote_deletion_propagates() {
    let a = synced_device(&["a.md", "b.md", "c.md"]).await;
    let b = device(a.remote.another_device()).await;
    b.sync().await;
    b.sync().await;

    a.store.delete("a.md");
    a.sync().await;

    let summary = b.sync().await;
    assert_eq!(summary.deleted, 1);
    assert!(b.store.get("a.md").is_none());
    assert_eq!(b.store.paths(), vec!["b.md", "c.md"]);
}

// ============================================================================
// Cursor Safety
// ============================================================================

/// A failed download keeps the previous cursor.
#[tokio::test]
async fn failed_download_blocks_cursor() {
    let d = device(MockRemote::new()).await;
    d.remote.seed_file("b.md", "remote", None);
    d.store.insert("a.md", "local");
    d.remote.fail_always(RemoteOp::Download, 503);

    let summary = d.sync().await;
    assert_eq!(summary.download_failures, 1);
    assert_eq!(summary.uploaded, 1);
    assert!(!summary.cursor_advanced);
    assert_eq!(d.cursor_time(), 0);
    assert_eq!(d.remote.count(RemoteOp::Download), 1);
    assert_eq!(d.remote.count(RemoteOp::Complete), 0);
    assert!(d.engine.is_dirty());

    d.remote.clear_failures(RemoteOp::Download);
    let retry = d.sync().await;
    assert_eq!(retry.downloaded, 1);
    assert!(retry.cursor_advanced);
    assert!(d.cursor_time() > 0);
}

/// Upload failures are retried next cycle but do not hold the cursor.
#[tokio::test]
async fn upload_failure_still_advances_cursor() {
    let d = device(MockRemote::new()).await;
    d.store.insert("a.md", "local");
    d.remote.fail_always(RemoteOp::Upload, 500);

    let summary = d.sync().await;
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.download_failures, 0);
    assert!(summary.cursor_advanced);
    assert!(d.cursor_time() > 0);
    assert_eq!(d.remote.count(RemoteOp::Upload), 3);
    assert!(d.engine.is_dirty());
}

/// A download instruction without a file id is a download failure.
#[tokio::test]
async fn malformed_instruction_blocks_cursor() {
    let d = device(MockRemote::new()).await;
    d.remote
        .script_delta(vec![scripted("x.md", SyncAction::Download, None)]);

    let summary = d.sync().await;
    assert_eq!(summary.download_failures, 1);
    assert!(!summary.cursor_advanced);
}

/// A failing completion call is only a warning.
#[tokio::test]
async fn complete_failure_is_tolerated() {
    let d = device(MockRemote::new()).await;
    d.store.insert("a.md", "x");
    d.remote.fail_always(RemoteOp::Complete, 500);

    let summary = d.sync().await;
    assert!(summary.is_clean());
    assert!(summary.cursor_advanced);
}

// ============================================================================
// Downloads
// ============================================================================

/// A remote-only file is created locally with its folders.
#[tokio::test]
async fn download_into_absent_file() {
    let d = device(MockRemote::new()).await;
    d.remote.seed_file("notes/daily/a.md", "from server", None);

    let summary = d.sync().await;
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.skipped_writes, 0);
    assert_eq!(d.store.get("notes/daily/a.md").unwrap(), b"from server");
}

/// Identical content is not rewritten; the server's hash is corrected.
#[tokio::test]
async fn identical_download_is_skipped() {
    let d = device(MockRemote::new()).await;
    d.store.insert("a.md", "same");
    let id = d.remote.seed_file("a.md", "same", Some("stale"));
    d.remote
        .script_delta(vec![scripted("a.md", SyncAction::Download, Some(id.clone()))]);

    let summary = d.sync().await;
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.skipped_writes, 1);
    assert_eq!(d.remote.file("a.md").unwrap().2, Some(content_hash(b"same")));
}

// ============================================================================
// Conflicts
// ============================================================================

/// Concurrent edits keep both versions.
#[tokio::test]
async fn concurrent_edits_keep_both() {
    let a = synced_device(&["notes/n.md"]).await;
    let b = device(a.remote.another_device()).await;
    b.sync().await;

    a.store.insert("notes/n.md", "edited on a");
    a.sync().await;
    b.store.insert("notes/n.md", "edited on b");

    let summary = b.sync().await;
    assert_eq!(summary.conflicted, 1);
    assert_eq!(summary.uploaded, 1);

    let copy = b
        .store
        .paths()
        .into_iter()
        .find(|p| p.starts_with("notes/n.conflict-") && p.ends_with(".md"))
        .unwrap();
    assert_eq!(b.store.get(&copy).unwrap(), b"edited on a");
    assert_eq!(b.store.get("notes/n.md").unwrap(), b"edited on b");
    assert_eq!(a.remote.file("notes/n.md").unwrap().1, b"edited on b");

    // a picks up b's version
    let back = a.sync().await;
    assert_eq!(back.downloaded, 1);
    assert_eq!(a.store.get("notes/n.md").unwrap(), b"edited on b");
}

/// Push mode resolves conflicts by uploading and never downloads.
#[tokio::test]
async fn push_mode_local_wins() {
    let remote = MockRemote::new();
    let d = device_with(remote, MemoryStateStore::new(), SyncMode::Push).await;
    d.store.insert("a.md", "local");
    let id = d.remote.seed_file("a.md", "server", None);
    d.remote.seed_file("b.md", "remote only", None);
    d.remote.script_delta(vec![
        scripted("a.md", SyncAction::Conflict, Some(id)),
        scripted("b.md", SyncAction::Download, Some(FileId::from("f2"))),
    ]);

    let summary = d.sync().await;
    assert_eq!(summary.conflicted, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(d.remote.file("a.md").unwrap().1, b"local");
    assert_eq!(d.store.paths(), vec!["a.md".to_string()]);
}

/// Pull mode resolves conflicts by overwriting and never uploads.
#[tokio::test]
async fn pull_mode_server_wins() {
    let remote = MockRemote::new();
    let d = device_with(remote, MemoryStateStore::new(), SyncMode::Pull).await;
    d.store.insert("a.md", "local");
    d.store.insert("c.md", "local only");
    let id = d.remote.seed_file("a.md", "server", None);
    d.remote.script_delta(vec![
        scripted("a.md", SyncAction::Conflict, Some(id)),
        scripted("c.md", SyncAction::Upload, None),
    ]);

    let summary = d.sync().await;
    assert_eq!(summary.conflicted, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(d.store.get("a.md").unwrap(), b"server");
    assert_eq!(d.remote.count(RemoteOp::Upload), 0);
}
