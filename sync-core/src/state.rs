//! Real-time channel connection state machine.
//!
//! Pure, side-effect-free: events in, new state plus actions out. The
//! WebSocket I/O lives in vaultsync-client, which interprets the actions.

use std::time::Duration;
use vaultsync_types::Notification;

/// Reconnect base delay cap.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter added to every reconnect delay.
pub const MAX_JITTER_MS: u64 = 5000;

/// Connection state of the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying.
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Open and receiving notifications.
    Connected,
    /// Lost or failed, waiting to retry.
    Reconnecting {
        /// Consecutive failed attempts so far.
        attempt: u32,
    },
}

impl ConnectionState {
    /// Start disconnected.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => {
                (Self::Connecting, vec![Action::Connect])
            }

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(ChannelEvent::Connected)],
            ),
            (Self::Connecting, Event::ConnectFailed { error }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::EmitEvent(ChannelEvent::ConnectionFailed { error }),
                    Action::StartReconnectTimer {
                        delay: calculate_backoff(1),
                    },
                ],
            ),

            // From Connected
            (Self::Connected, Event::NotificationReceived { notification }) => {
                if notification.requests_sync() {
                    (Self::Connected, vec![Action::RequestSync])
                } else {
                    (Self::Connected, vec![])
                }
            }
            (Self::Connected, Event::Disconnected { reason }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::EmitEvent(ChannelEvent::Disconnected { reason }),
                    Action::StartReconnectTimer {
                        delay: calculate_backoff(1),
                    },
                ],
            ),
            (Self::Connected, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![
                    Action::Disconnect,
                    Action::EmitEvent(ChannelEvent::Disconnected {
                        reason: "user requested".into(),
                    }),
                ],
            ),

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => {
                (Self::Reconnecting { attempt }, vec![Action::Connect])
            }
            (Self::Reconnecting { .. }, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::EmitEvent(ChannelEvent::Connected)],
            ),
            (Self::Reconnecting { attempt }, Event::ConnectFailed { error }) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::EmitEvent(ChannelEvent::ReconnectFailed {
                            attempt: next_attempt,
                            error,
                        }),
                        Action::StartReconnectTimer {
                            delay: calculate_backoff(next_attempt),
                        },
                    ],
                )
            }
            (Self::Reconnecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CancelReconnect])
            }
            (Self::Connecting, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::Disconnect])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events in the channel lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to open the channel.
    ConnectRequested,
    /// Channel opened.
    ConnectSucceeded,
    /// Channel failed to open.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// A notification arrived.
    NotificationReceived {
        /// The decoded notification.
        notification: Notification,
    },
    /// Channel was lost.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// Caller asked to close the channel.
    DisconnectRequested,
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions for the channel driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the WebSocket.
    Connect,
    /// Close the WebSocket.
    Disconnect,
    /// Ask the coordinator for a cycle.
    RequestSync,
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Report a lifecycle change.
    EmitEvent(ChannelEvent),
}

/// Lifecycle changes reported to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Channel is open.
    Connected,
    /// First connection attempt failed.
    ConnectionFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Channel closed.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Which reconnection attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
}

/// Reconnect delay: `min(30s, 2^attempt s) + random(0..=5000ms)`.
pub fn calculate_backoff(attempt: u32) -> Duration {
    let base_secs = 2u64.pow(attempt.min(5)).min(MAX_BACKOFF.as_secs());
    Duration::from_secs(base_secs) + Duration::from_millis(random_jitter_ms())
}

fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % (MAX_JITTER_MS + 1),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_update() -> Notification {
        Notification::SyncUpdate {
            action: "upload".into(),
            file_path: "a.md".into(),
        }
    }

    #[test]
    fn starts_disconnected() {
        assert_eq!(ConnectionState::new(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_request_transitions_to_connecting() {
        let (state, actions) = ConnectionState::Disconnected.on_event(Event::ConnectRequested);
        assert_eq!(state, ConnectionState::Connecting);
        assert!(actions.iter().any(|a| matches!(a, Action::Connect)));
    }

    #[test]
    fn connect_success_transitions_to_connected() {
        let (state, actions) = ConnectionState::Connecting.on_event(Event::ConnectSucceeded);
        assert_eq!(state, ConnectionState::Connected);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitEvent(ChannelEvent::Connected))));
    }

    #[test]
    fn connect_failure_triggers_reconnect() {
        let (state, actions) = ConnectionState::Connecting.on_event(Event::ConnectFailed {
            error: "refused".into(),
        });
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 1 });
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::StartReconnectTimer { .. })));
    }

    #[test]
    fn sync_update_requests_sync() {
        let (state, actions) = ConnectionState::Connected.on_event(Event::NotificationReceived {
            notification: sync_update(),
        });
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(actions, vec![Action::RequestSync]);
    }

    #[test]
    fn other_notification_is_ignored() {
        let (state, actions) = ConnectionState::Connected.on_event(Event::NotificationReceived {
            notification: Notification::Other,
        });
        assert_eq!(state, ConnectionState::Connected);
        assert!(actions.is_empty());
    }

    #[test]
    fn notification_while_reconnecting_is_ignored() {
        let state = ConnectionState::Reconnecting { attempt: 2 };
        let (new_state, actions) = state.on_event(Event::NotificationReceived {
            notification: sync_update(),
        });
        assert_eq!(new_state, state);
        assert!(actions.is_empty());
    }

    #[test]
    fn reconnect_timer_connects_and_keeps_attempt() {
        let (state, actions) =
            ConnectionState::Reconnecting { attempt: 3 }.on_event(Event::ReconnectTimer);
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 3 });
        assert_eq!(actions, vec![Action::Connect]);
    }

    #[test]
    fn reconnect_failure_increments_attempt() {
        let (state, actions) =
            ConnectionState::Reconnecting { attempt: 2 }.on_event(Event::ConnectFailed {
                error: "timeout".into(),
            });
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 3 });
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EmitEvent(ChannelEvent::ReconnectFailed { attempt: 3, .. })
        )));
    }

    #[test]
    fn full_reconnection_flow() {
        let state = ConnectionState::Connected;
        let (state, _) = state.on_event(Event::Disconnected {
            reason: "reset".into(),
        });
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 1 });

        let (state, _) = state.on_event(Event::ReconnectTimer);
        let (state, _) = state.on_event(Event::ConnectFailed {
            error: "refused".into(),
        });
        assert_eq!(state, ConnectionState::Reconnecting { attempt: 2 });

        let (state, _) = state.on_event(Event::ReconnectTimer);
        let (state, _) = state.on_event(Event::ConnectSucceeded);
        assert!(state.is_connected());
    }

    #[test]
    fn disconnect_request_from_connected() {
        let (state, actions) = ConnectionState::Connected.on_event(Event::DisconnectRequested);
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.iter().any(|a| matches!(a, Action::Disconnect)));
    }

    #[test]
    fn disconnect_request_from_reconnecting_cancels() {
        let (state, actions) =
            ConnectionState::Reconnecting { attempt: 2 }.on_event(Event::DisconnectRequested);
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(actions.iter().any(|a| matches!(a, Action::CancelReconnect)));
    }

    #[test]
    fn helpers() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Disconnected.is_connecting());
        assert!(ConnectionState::Connecting.is_connecting());
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnecting { attempt: 1 }.is_connecting());
    }

    // ===========================================
    // Backoff Tests
    // ===========================================

    #[test]
    fn backoff_increases_with_attempt() {
        assert!(calculate_backoff(1) >= Duration::from_secs(2));
        assert!(calculate_backoff(3) >= Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped_at_30_seconds_plus_jitter() {
        for attempt in [5, 10, u32::MAX] {
            let delay = calculate_backoff(attempt);
            assert!(delay >= Duration::from_secs(30));
            assert!(
                delay <= Duration::from_secs(35),
                "delay must be capped at 35s, got {:?}",
                delay
            );
        }
    }

    #[test]
    fn backoff_jitter_creates_variance() {
        let delays: Vec<Duration> = (0..20).map(|_| calculate_backoff(3)).collect();
        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();
        assert!(
            max.as_millis() - min.as_millis() >= 100,
            "expected jitter variance, got min={:?} max={:?}",
            min,
            max
        );
    }
}
