//! Keep the vault in sync until interrupted.
//!
//! Filesystem events feed the coordinator as local changes, the real-time
//! channel feeds it remote changes, and the configured schedule decides
//! when cycles run.

use anyhow::{Context, Result};
use notify_debouncer_full::{
    new_debouncer, notify::EventKind, notify::RecommendedWatcher, notify::RecursiveMode,
    DebounceEventResult, Debouncer, RecommendedCache,
};
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use vaultsync_client::{realtime_url, Coordinator, CoordinatorInput, RealtimeChannel};
use vaultsync_core::PathFilter;

use super::{open_engine, save_session};
use crate::config::Config;

/// Coalescing window for raw filesystem events.
const FS_EVENT_WINDOW: Duration = Duration::from_millis(500);

/// Run the watch command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let config = Config::load(data_dir).await?;
    let engine = Arc::new(open_engine(data_dir, &config).await?);
    let vault = tokio::fs::canonicalize(config.vault_path()?)
        .await
        .context("Vault folder not found")?;

    let (inputs, inputs_rx) = mpsc::channel(64);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let filter = PathFilter::new(&config.exclude).context("Invalid exclude pattern")?;
    let _watcher = VaultWatcher::start(&vault, filter, inputs.clone())?;

    let coordinator = Coordinator::new(Arc::clone(&engine), config.schedule.policy())
        .with_realtime_debounce(config.schedule.realtime_debounce());
    let coordinator = tokio::spawn(coordinator.run(inputs_rx, shutdown_rx.clone()));

    let realtime = if config.schedule.realtime {
        let url = realtime_url(config.server_url()?)?;
        let token = engine.remote().tokens().await.map(|t| t.access_token);
        Some(tokio::spawn(
            RealtimeChannel::new(url, token).run(inputs.clone(), shutdown_rx),
        ))
    } else {
        None
    };

    // Catch up on whatever changed while we were not running.
    inputs
        .send(CoordinatorInput::SyncNow)
        .await
        .context("Coordinator stopped")?;

    println!("Watching {} (Ctrl-C to stop)", vault.display());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("Stopping...");
    let _ = shutdown.send(true);
    let _ = coordinator.await;
    if let Some(realtime) = realtime {
        let _ = realtime.await;
    }
    save_session(&engine).await?;

    Ok(())
}

/// Turns filesystem events under the vault into [`CoordinatorInput::LocalChange`].
///
/// Must be kept alive for events to keep flowing.
struct VaultWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl VaultWatcher {
    fn start(root: &Path, filter: PathFilter, inputs: mpsc::Sender<CoordinatorInput>) -> Result<Self> {
        let base = root.to_path_buf();
        let mut debouncer = new_debouncer(
            FS_EVENT_WINDOW,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let changed = events.iter().any(|event| {
                        is_content_change(&event.kind)
                            && event
                                .paths
                                .iter()
                                .any(|path| is_tracked(&base, &filter, path))
                    });
                    // a full channel already holds a pending change
                    if changed && inputs.try_send(CoordinatorInput::LocalChange).is_ok() {
                        tracing::debug!("Local change detected");
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::warn!("Vault watcher error: {}", e);
                    }
                }
            },
        )
        .context("Failed to start vault watcher")?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        tracing::info!("Watching vault at {}", root.display());

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Vault-relative, `/`-separated form of `path`, if it lies under `root`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn is_tracked(root: &Path, filter: &PathFilter, path: &Path) -> bool {
    relative_path(root, path).is_some_and(|rel| !filter.is_excluded(&rel))
}
