//! Schedule coordinator.
//!
//! One loop decides when cycles run. Local change events, remote
//! notifications and manual requests arrive as [`CoordinatorInput`];
//! debounce timers and the interval ticker turn them into [`Trigger`]s, and
//! each trigger is handed to the engine on its own task. The engine's
//! in-progress flag keeps cycles single-flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use vaultsync_core::schedule::DEFAULT_REALTIME_DEBOUNCE;
use vaultsync_core::{SchedulePolicy, Trigger};

use crate::engine::SyncEngine;
use crate::remote::RemoteStore;
use crate::state::StateStore;
use crate::store::VaultStore;
use crate::EngineError;

/// Something the coordinator reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorInput {
    /// A file in the vault changed.
    LocalChange,
    /// The remote store announced a change.
    RemoteChange,
    /// The user asked for a sync.
    SyncNow,
}

/// A restartable one-shot timer that emits a [`Trigger`] when it fires.
///
/// Scheduling again before it fires pushes the deadline back, so a burst
/// of events yields one trigger.
#[derive(Debug)]
pub struct DebounceTimer {
    trigger: Trigger,
    tx: mpsc::UnboundedSender<Trigger>,
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    /// Timer that sends `trigger` on `tx`.
    pub fn new(trigger: Trigger, tx: mpsc::UnboundedSender<Trigger>) -> Self {
        Self {
            trigger,
            tx,
            pending: None,
        }
    }

    /// Fire after `delay`, replacing any pending deadline.
    pub fn schedule(&mut self, delay: Duration) {
        self.cancel();
        let tx = self.tx.clone();
        let trigger = self.trigger;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(trigger);
        }));
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether a deadline is pending.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Drives an engine according to a [`SchedulePolicy`].
pub struct Coordinator<S, R, P> {
    engine: Arc<SyncEngine<S, R, P>>,
    policy: SchedulePolicy,
    realtime_debounce: Duration,
}

impl<S, R, P> Coordinator<S, R, P>
where
    S: VaultStore + 'static,
    R: RemoteStore + 'static,
    P: StateStore + 'static,
{
    /// Coordinator for `engine`.
    pub fn new(engine: Arc<SyncEngine<S, R, P>>, policy: SchedulePolicy) -> Self {
        Self {
            engine,
            policy,
            realtime_debounce: DEFAULT_REALTIME_DEBOUNCE,
        }
    }

    /// Quiet period applied to remote notifications.
    pub fn with_realtime_debounce(mut self, quiet: Duration) -> Self {
        self.realtime_debounce = quiet;
        self
    }

    /// Run until `shutdown` flips to true, its sender is dropped, or the
    /// input channel closes. Every spawned cycle is awaited before returning;
    /// none is cancelled.
    pub async fn run(self, mut inputs: mpsc::Receiver<CoordinatorInput>, mut shutdown: watch::Receiver<bool>) {
        let (fire_tx, mut fired) = mpsc::unbounded_channel();
        let mut local_timer = DebounceTimer::new(Trigger::LocalChange, fire_tx.clone());
        let mut remote_timer = DebounceTimer::new(Trigger::Remote, fire_tx);
        let mut ticker = self.policy.interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        let mut cycles = JoinSet::new();

        tracing::info!("Coordinator started ({:?})", self.policy);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                input = inputs.recv() => match input {
                    Some(CoordinatorInput::LocalChange) => {
                        if self.engine.note_local_change() {
                            if let Some(quiet) = self.policy.debounce_after_change() {
                                local_timer.schedule(quiet);
                            }
                        }
                    }
                    Some(CoordinatorInput::RemoteChange) => {
                        remote_timer.schedule(self.realtime_debounce);
                    }
                    Some(CoordinatorInput::SyncNow) => {
                        self.spawn_cycle(&mut cycles, Trigger::Manual);
                    }
                    None => break,
                },
                Some(trigger) = fired.recv() => {
                    self.spawn_cycle(&mut cycles, trigger);
                }
                _ = tick(&mut ticker) => {
                    self.spawn_cycle(&mut cycles, Trigger::Interval);
                }
                Some(finished) = cycles.join_next(), if !cycles.is_empty() => {
                    reap(finished);
                }
            }
        }

        local_timer.cancel();
        remote_timer.cancel();
        if !cycles.is_empty() {
            tracing::info!("Waiting for {} running sync task(s)", cycles.len());
        }
        while let Some(finished) = cycles.join_next().await {
            reap(finished);
        }
        tracing::info!("Coordinator stopped");
    }

    fn spawn_cycle(&self, cycles: &mut JoinSet<()>, trigger: Trigger) {
        let engine = Arc::clone(&self.engine);
        cycles.spawn(async move {
            match engine.run_cycle(trigger).await {
                Ok(Some(_)) | Ok(None) => {}
                Err(EngineError::SyncInProgress) => {
                    tracing::info!("Sync already in progress");
                }
                Err(e) => tracing::error!("Sync failed: {}", e),
            }
        });
    }
}

fn reap(finished: Result<(), tokio::task::JoinError>) {
    if let Err(e) = finished {
        tracing::error!("Sync task ended abnormally: {}", e);
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
