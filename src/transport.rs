//! WebSocket transport channel.
//!
//! Owns the duplex connection to the recognition server: JSON control
//! messages and binary audio chunks travel over the same socket. The
//! channel reconnects on clean disconnects after a fixed delay and
//! treats any abnormal termination as a single-writer rejection, which
//! is terminal.

use crate::protocol::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::Message;

/// Fixed delay before a reconnection attempt after a clean disconnect.
/// Not exponential; the server drives session state, so there is
/// nothing to resume and no reason to back off.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Which server endpoint this channel talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Audio-sending controller connection.
    Control,
    /// Read-only viewer connection.
    Watch,
}

impl Role {
    fn path_segment(&self) -> &'static str {
        match self {
            Role::Control => "control",
            Role::Watch => "watch",
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    /// Graceful disconnect; a reconnect is pending.
    ClosedClean,
    /// Abnormal termination: another controller owns this stream (or the
    /// endpoint refused the handshake). Terminal, no retry.
    ClosedRejected,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL, e.g. `ws://127.0.0.1:8000`.
    pub server_url: String,
    /// Broadcast session identifier from the request path.
    pub session_id: String,
    pub role: Role,
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(server_url: impl Into<String>, session_id: impl Into<String>, role: Role) -> Self {
        Self {
            server_url: server_url.into(),
            session_id: session_id.into(),
            role,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/ws/liveasr/{}/{}",
            self.server_url.trim_end_matches('/'),
            self.role.path_segment(),
            self.session_id
        )
    }
}

/// Events surfaced to the application layer.
#[derive(Debug)]
pub enum TransportEvent {
    /// Connection established (also after each reconnect). The settings
    /// layer pushes a fresh config snapshot on this event.
    Opened,
    /// Parsed inbound control message.
    Message(ServerMessage),
    /// Clean disconnect; a reconnect has been scheduled.
    ClosedClean,
    /// Terminal rejection. No reconnect will follow.
    Rejected,
}

/// Cheap cloneable handle for outbound traffic and state queries.
///
/// Sends are best-effort: anything submitted while the channel is not
/// `Open` is dropped, never queued.
#[derive(Clone)]
pub struct TransportHandle {
    state: Arc<Mutex<TransportState>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl TransportHandle {
    pub fn state(&self) -> TransportState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Send a control message. Returns `false` if the message was
    /// dropped because the channel is not open.
    pub fn send_control(&self, msg: &ClientMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outbound
            .send(Message::Text(msg.to_json().into()))
            .is_ok()
    }

    /// Send a binary audio chunk. Returns `false` if dropped.
    pub fn send_chunk(&self, bytes: Vec<u8>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outbound.send(Message::Binary(bytes.into())).is_ok()
    }

    #[cfg(test)]
    pub(crate) fn detached(
        initial: TransportState,
    ) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(initial)),
                outbound: tx,
            },
            rx,
        )
    }
}

/// The transport channel task plus its control handle.
pub struct TransportChannel {
    pub handle: TransportHandle,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub task: JoinHandle<()>,
}

impl TransportChannel {
    /// Open a channel to the configured endpoint. The background task
    /// owns the socket and keeps reconnecting until it is rejected or
    /// the handle is dropped.
    pub fn spawn(config: TransportConfig) -> Self {
        let state = Arc::new(Mutex::new(TransportState::Connecting));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let handle = TransportHandle {
            state: state.clone(),
            outbound: outbound_tx,
        };

        let task = tokio::spawn(run(config, state, event_tx, outbound_rx));

        Self {
            handle,
            events: event_rx,
            task,
        }
    }
}

fn set_state(state: &Arc<Mutex<TransportState>>, value: TransportState) {
    *state.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

async fn run(
    config: TransportConfig,
    state: Arc<Mutex<TransportState>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    let url = config.endpoint();
    loop {
        set_state(&state, TransportState::Connecting);
        info!("connecting to {}", url);

        let ws = match connect_async(&url).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                // A refused handshake is how the server signals that
                // another controller already owns this stream. There is
                // no explicit rejection message type.
                warn!("connection rejected: {}", e);
                set_state(&state, TransportState::ClosedRejected);
                let _ = events.send(TransportEvent::Rejected);
                return;
            }
        };

        set_state(&state, TransportState::Open);
        info!("connected ({:?})", config.role);
        let _ = events.send(TransportEvent::Opened);

        let (mut ws_tx, mut ws_rx) = ws.split();

        let clean = loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let frame = match frame {
                        Some(f) => f,
                        None => {
                            // Handle dropped: the client is shutting down.
                            let _ = ws_tx.close().await;
                            set_state(&state, TransportState::ClosedClean);
                            return;
                        }
                    };
                    if let Err(e) = ws_tx.send(frame).await {
                        warn!("send failed: {}", e);
                        break false;
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(ServerMessage::Unknown) => {
                                    warn!("ignoring message with unknown type: {}", text);
                                }
                                Ok(parsed) => {
                                    let _ = events.send(TransportEvent::Message(parsed));
                                }
                                Err(e) => {
                                    warn!("ignoring malformed control message: {}", e);
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let policy = frame
                                .as_ref()
                                .map(|f| f.code == CloseCode::Policy)
                                .unwrap_or(false);
                            if policy {
                                warn!("close frame: policy violation");
                            } else {
                                debug!("close frame received");
                            }
                            break !policy;
                        }
                        Some(Ok(_)) => {} // ping/pong/unexpected binary
                        Some(Err(e)) => {
                            warn!("websocket error: {}", e);
                            break false;
                        }
                        None => break true,
                    }
                }
            }
        };

        if clean {
            set_state(&state, TransportState::ClosedClean);
            let _ = events.send(TransportEvent::ClosedClean);
            info!(
                "disconnected; reconnecting in {:?}",
                config.reconnect_delay
            );
            tokio::time::sleep(config.reconnect_delay).await;
        } else {
            set_state(&state, TransportState::ClosedRejected);
            let _ = events.send(TransportEvent::Rejected);
            return;
        }
    }
}
