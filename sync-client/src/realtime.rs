//! Real-time notification channel.
//!
//! A WebSocket to the remote store that turns `sync_update` messages into
//! [`CoordinatorInput::RemoteChange`]. Connection handling follows the
//! pure [`ConnectionState`] machine from vaultsync-core: this module only
//! performs the actions it returns.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use vaultsync_core::{Action, ChannelEvent, ConnectionState, Event};
use vaultsync_types::Notification;

use crate::scheduler::CoordinatorInput;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Give up on a single connection attempt after this long.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Channel setup errors.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The server URL cannot be turned into a WebSocket URL.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// The connection attempt failed.
    #[error("connect failed: {0}")]
    Connect(String),
}

/// WebSocket endpoint for a server base URL (`https://h/api` → `wss://h/api/ws`).
pub fn realtime_url(base_url: &str) -> Result<String, RealtimeError> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_string()
    } else {
        return Err(RealtimeError::InvalidUrl(base_url.to_string()));
    };
    Ok(format!("{rest}/ws"))
}

/// The notification channel for one account.
#[derive(Debug, Clone)]
pub struct RealtimeChannel {
    url: String,
    access_token: Option<String>,
}

impl RealtimeChannel {
    /// Channel to `url`, authenticated with `access_token` when given.
    pub fn new(url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            access_token,
        }
    }

    /// Keep the channel open until `shutdown` flips to true or its sender
    /// is dropped, reconnecting with backoff in between.
    pub async fn run(self, inputs: mpsc::Sender<CoordinatorInput>, mut shutdown: watch::Receiver<bool>) {
        let mut state = ConnectionState::new();
        let mut queue = VecDeque::from([Event::ConnectRequested]);
        let mut socket: Option<Socket> = None;
        let mut reconnect_at: Option<Instant> = None;

        loop {
            while let Some(event) = queue.pop_front() {
                let (next, actions) = state.on_event(event);
                state = next;
                for action in actions {
                    match action {
                        Action::Connect => match self.connect().await {
                            Ok(ws) => {
                                socket = Some(ws);
                                queue.push_back(Event::ConnectSucceeded);
                            }
                            Err(e) => queue.push_back(Event::ConnectFailed {
                                error: e.to_string(),
                            }),
                        },
                        Action::Disconnect => {
                            if let Some(mut ws) = socket.take() {
                                let _ = ws.close(None).await;
                            }
                        }
                        Action::RequestSync => {
                            if inputs.send(CoordinatorInput::RemoteChange).await.is_err() {
                                tracing::debug!("Coordinator gone; closing real-time channel");
                                queue.push_back(Event::DisconnectRequested);
                            }
                        }
                        Action::StartReconnectTimer { delay } => {
                            tracing::debug!("Reconnecting in {:?}", delay);
                            reconnect_at = Some(Instant::now() + delay);
                        }
                        Action::CancelReconnect => reconnect_at = None,
                        Action::EmitEvent(event) => log_event(event),
                    }
                }
            }

            if state == ConnectionState::Disconnected {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        queue.push_back(Event::DisconnectRequested);
                    }
                }
                _ = sleep_until(reconnect_at) => {
                    reconnect_at = None;
                    queue.push_back(Event::ReconnectTimer);
                }
                frame = next_frame(&mut socket) => match frame {
                    Some(Ok(Message::Text(text))) => match Notification::from_json(&text) {
                        Ok(notification) => {
                            tracing::debug!("Notification: {:?}", notification);
                            queue.push_back(Event::NotificationReceived { notification });
                        }
                        Err(e) => tracing::debug!("Ignoring unparseable message: {}", e),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Some(ws) = socket.as_mut() {
                            let _ = ws.send(Message::Pong(data)).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        socket = None;
                        queue.push_back(Event::Disconnected {
                            reason: "closed by server".into(),
                        });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        socket = None;
                        queue.push_back(Event::Disconnected {
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }
        tracing::info!("Real-time channel closed");
    }

    async fn connect(&self) -> Result<Socket, RealtimeError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;
        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RealtimeError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| RealtimeError::Connect("timed out".into()))?
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;
        Ok(ws)
    }
}

fn log_event(event: ChannelEvent) {
    match event {
        ChannelEvent::Connected => tracing::info!("Real-time channel connected"),
        ChannelEvent::ConnectionFailed { error } => {
            tracing::warn!("Real-time channel failed to connect: {}", error)
        }
        ChannelEvent::Disconnected { reason } => {
            tracing::warn!("Real-time channel disconnected: {}", reason)
        }
        ChannelEvent::ReconnectFailed { attempt, error } => {
            tracing::warn!("Reconnect attempt {} failed: {}", attempt, error)
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    socket: &mut Option<Socket>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match socket {
        Some(ws) => ws.next().await,
        None => std::future::pending().await,
    }
}
