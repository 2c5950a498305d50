//! One websocket connection to one audio node, with auto-reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tonearm_common::NodeId;
use tracing::{debug, error, info, trace, warn};

use super::backoff::{ReconnectState, Reconnector};
use super::types::{ConnectionState, NodeConfig, NodeEvent, NodeSnapshot};
use crate::protocol::{parse_incoming, IncomingMessage, NodeStats, OutgoingCommand};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Mutable node state, kept under one lock.
#[derive(Debug)]
struct NodeShared {
    state: ConnectionState,
    draining: bool,
    reconnect: Reconnector,
    stats: NodeStats,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to one node. Owned by the pool, shared read-only with sessions.
pub struct NodeConnection {
    config: NodeConfig,
    shared: RwLock<NodeShared>,
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Taken by the connection task on the first `connect`.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    event_tx: mpsc::Sender<NodeEvent>,
    destroyed: watch::Sender<bool>,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NodeConnection {
    /// Create a disconnected node. Returns the handle and its event stream.
    pub fn new(config: NodeConfig, event_buffer: usize) -> (Arc<Self>, mpsc::Receiver<NodeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (destroyed, _) = watch::channel(false);

        let node = Arc::new(Self {
            config,
            shared: RwLock::new(NodeShared {
                state: ConnectionState::Disconnected,
                draining: false,
                reconnect: Reconnector::default(),
                stats: NodeStats::default(),
            }),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            event_tx,
            destroyed,
        });
        (node, event_rx)
    }

    pub fn id(&self) -> &NodeId {
        &self.config.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn region(&self) -> Option<&str> {
        self.config.region.as_deref()
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.read().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub async fn is_draining(&self) -> bool {
        self.shared.read().await.draining
    }

    /// Stop (or resume) accepting new sessions. Existing ones stay bound.
    pub async fn set_draining(&self, draining: bool) {
        self.shared.write().await.draining = draining;
        info!(node = %self.id(), draining, "Node drain flag changed");
    }

    pub async fn stats(&self) -> NodeStats {
        self.shared.read().await.stats.clone()
    }

    pub async fn retries(&self) -> u32 {
        self.shared.read().await.reconnect.retries()
    }

    pub async fn reconnect_state(&self) -> ReconnectState {
        self.shared.read().await.reconnect.state()
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let shared = self.shared.read().await;
        NodeSnapshot {
            id: self.config.id.clone(),
            region: self.config.region.clone(),
            connected: shared.state == ConnectionState::Connected,
            draining: shared.draining,
            players: shared.stats.players,
        }
    }

    /// Start the background connection task. Calling it again is a no-op.
    pub async fn connect(self: &Arc<Self>) {
        let Some(outbound_rx) = self.outbound_rx.lock().await.take() else {
            debug!(node = %self.id(), "Connection task already running");
            return;
        };
        tokio::spawn(connection_loop(Arc::clone(self), outbound_rx));
    }

    /// Serialize and send one command.
    ///
    /// Never fails from the caller's point of view: if the socket is not
    /// open the command is dropped and a `NodeEvent::Error` is emitted.
    /// Returns whether the frame was handed to the socket writer.
    pub async fn send(&self, command: &OutgoingCommand) -> bool {
        if self.state().await != ConnectionState::Connected {
            warn!(node = %self.id(), op = command.op(), guild = %command.guild_id(), "Dropping command, node not connected");
            self.emit(NodeEvent::Error(format!(
                "dropped {} for guild {}: node not connected",
                command.op(),
                command.guild_id()
            )));
            return false;
        }

        let frame = match serde_json::to_string(command) {
            Ok(frame) => frame,
            Err(e) => {
                self.emit(NodeEvent::Error(format!("failed to serialize {}: {e}", command.op())));
                return false;
            }
        };

        trace!(node = %self.id(), frame = %frame, "Sending");
        if self.outbound_tx.send(frame).is_err() {
            self.emit(NodeEvent::Error(format!(
                "dropped {} for guild {}: connection task gone",
                command.op(),
                command.guild_id()
            )));
            return false;
        }
        true
    }

    /// Close the socket for good. The reconnect path is detached first so
    /// the close does not schedule another attempt.
    pub async fn destroy(&self) {
        self.destroyed.send_replace(true);
        let mut shared = self.shared.write().await;
        shared.reconnect.cancel();
        shared.state = ConnectionState::Disconnected;
        info!(node = %self.id(), "Node destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    /// Handle one inbound text frame.
    pub(crate) async fn on_message(&self, raw: &str) {
        match parse_incoming(raw) {
            Ok(IncomingMessage::Stats(stats)) => {
                self.shared.write().await.stats = stats.clone();
                self.emit(NodeEvent::Stats(stats));
            }
            Ok(message) => self.emit(NodeEvent::Message(message)),
            Err(e) => {
                warn!(node = %self.id(), error = %e, "Malformed frame from node");
                self.emit(NodeEvent::Error(format!("malformed frame: {e}")));
            }
        }
    }

    async fn mark_connecting(&self) {
        let mut shared = self.shared.write().await;
        shared.state = ConnectionState::Connecting;
        shared.reconnect.on_connect_attempt();
    }

    async fn mark_ready(&self) {
        {
            let mut shared = self.shared.write().await;
            shared.state = ConnectionState::Connected;
            shared.reconnect.on_ready();
        }
        info!(node = %self.id(), "Connected to audio node");
        self.emit(NodeEvent::Ready);
    }

    /// Record a close and arm the reconnect timer. Returns when to retry.
    async fn mark_disconnected(&self, reason: String) -> Instant {
        let now = Instant::now();
        let deadline = {
            let mut shared = self.shared.write().await;
            shared.state = ConnectionState::Disconnected;
            if let Some(delay) = shared.reconnect.on_disconnect(now) {
                info!(
                    node = %self.id(),
                    attempt = shared.reconnect.retries(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting in {} seconds",
                    delay.as_secs()
                );
            }
            shared.reconnect.deadline().unwrap_or(now)
        };
        self.emit(NodeEvent::Disconnected { reason });
        deadline
    }

    /// Never waits: callers may hold a session lock that the router needs
    /// in order to drain this channel.
    fn emit(&self, event: NodeEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(node = %self.id(), event = ?event, "Node event channel full, dropping event");
            }
        }
    }

    /// Attach a fake socket: mark the node connected and hand back the frames
    /// that would have gone on the wire.
    #[cfg(test)]
    pub(crate) async fn attach_for_test(&self) -> mpsc::UnboundedReceiver<String> {
        let rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .expect("node already attached");
        self.shared.write().await.state = ConnectionState::Connected;
        rx
    }

    #[cfg(test)]
    pub(crate) async fn set_state_for_test(&self, state: ConnectionState) {
        self.shared.write().await.state = state;
    }

    #[cfg(test)]
    pub(crate) fn emit_for_test(&self, event: NodeEvent) {
        self.emit(event);
    }

    #[cfg(test)]
    pub(crate) async fn set_players_for_test(&self, players: u32) {
        self.shared.write().await.stats.players = players;
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

async fn connection_loop(node: Arc<NodeConnection>, mut outbound_rx: mpsc::UnboundedReceiver<String>) {
    let mut destroyed = node.destroyed.subscribe();

    loop {
        if *destroyed.borrow() {
            break;
        }
        node.mark_connecting().await;

        let request = match node.config.handshake_request() {
            Ok(request) => request,
            Err(e) => {
                // Bad url or header values will not fix themselves.
                error!(node = %node.id(), error = %e, "Cannot build handshake");
                node.emit(NodeEvent::Error(e.to_string()));
                node.shared.write().await.state = ConnectionState::Disconnected;
                return;
            }
        };

        info!(node = %node.id(), url = %node.config.url, "Connecting to audio node");
        let reason = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            tokio_tungstenite::connect_async(request),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                node.mark_ready().await;
                let (mut ws_write, mut ws_read) = ws_stream.split();

                loop {
                    tokio::select! {
                        _ = destroyed.changed() => {
                            let _ = ws_write.send(WsMessage::Close(None)).await;
                            break "destroyed".to_string();
                        }
                        Some(frame) = outbound_rx.recv() => {
                            if let Err(e) = ws_write.send(WsMessage::Text(frame.into())).await {
                                warn!(node = %node.id(), error = %e, "WebSocket write failed");
                                break format!("write failed: {e}");
                            }
                        }
                        msg = ws_read.next() => match msg {
                            Some(Ok(WsMessage::Text(text))) => node.on_message(text.as_str()).await,
                            Some(Ok(WsMessage::Close(frame))) => {
                                let reason = frame
                                    .map(|f| format!("closed by node ({}): {}", u16::from(f.code), f.reason.as_str()))
                                    .unwrap_or_else(|| "closed by node".to_string());
                                info!(node = %node.id(), reason = %reason, "Node closed connection");
                                break reason;
                            }
                            Some(Err(e)) => {
                                warn!(node = %node.id(), error = %e, "WebSocket error");
                                break format!("socket error: {e}");
                            }
                            None => break "stream ended".to_string(),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Err(e)) => {
                error!(node = %node.id(), error = %e, "Failed to connect to audio node");
                node.emit(NodeEvent::Error(format!("connection failed: {e}")));
                format!("connection failed: {e}")
            }
            Err(_elapsed) => {
                error!(node = %node.id(), "Connection timed out after 15s");
                node.emit(NodeEvent::Error("connection timed out after 15s".into()));
                "connection timed out".to_string()
            }
        };

        if *destroyed.borrow() {
            break;
        }

        // Frames queued against the dead socket are not replayed.
        let mut dropped = 0usize;
        while outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(node = %node.id(), dropped, "Discarded frames queued before disconnect");
            node.emit(NodeEvent::Error(format!(
                "dropped {dropped} frame(s) queued before disconnect"
            )));
        }

        let deadline = node.mark_disconnected(reason).await;
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = destroyed.changed() => break,
        }
    }

    node.shared.write().await.state = ConnectionState::Disconnected;
    debug!(node = %node.id(), "Connection task finished");
}
