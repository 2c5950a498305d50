//! Pool-level options and events.

use tokio::sync::mpsc;
use tonearm_common::{GuildId, NodeId};
use tracing::warn;

use crate::session::SessionEvent;

/// How a new session should be placed.
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    pub channel_id: String,
    /// Preferred node region.
    pub region: Option<String>,
    /// Pin the session to this node instead of running selection.
    pub node: Option<NodeId>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl JoinOptions {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            ..Self::default()
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn node(mut self, node: impl Into<NodeId>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn deafened(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }

    pub fn muted(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }
}

/// Everything the pool reports to the owning application.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    NodeReady(NodeId),
    NodeDisconnected { node: NodeId, reason: String },
    NodeError { node: NodeId, message: String },
    /// A node sent a frame for a guild with no session.
    Unroutable { node: NodeId, guild_id: GuildId },
    Session { guild_id: GuildId, event: SessionEvent },
}

/// Publish without waiting. A full or closed channel drops the event.
pub(crate) fn emit(tx: &mpsc::Sender<PoolEvent>, event: PoolEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
        warn!(event = ?event, "Pool event channel full, dropping event");
    }
}

/// Voice credentials collected from the gateway, possibly half complete.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingVoice {
    pub session_id: Option<String>,
    pub event: Option<serde_json::Value>,
}
