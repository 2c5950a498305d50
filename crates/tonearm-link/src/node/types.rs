//! Configuration, state and event types for node connections.

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tonearm_common::{LinkError, NodeId};
use tonearm_config::NodeEntry;

use crate::protocol::{IncomingMessage, NodeStats};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything needed to open and authenticate one node connection.
#[derive(Clone)]
pub struct NodeConfig {
    pub id: NodeId,
    pub url: String,
    pub password: String,
    pub region: Option<String>,
    /// Bot user id, sent as `User-Id`.
    pub user_id: String,
    /// Sent as `Num-Shards`.
    pub shard_count: u32,
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("password", &"[REDACTED]")
            .field("region", &self.region)
            .field("user_id", &self.user_id)
            .field("shard_count", &self.shard_count)
            .finish()
    }
}

impl NodeConfig {
    pub fn from_entry(entry: &NodeEntry, user_id: &str, shard_count: u32) -> Self {
        Self {
            id: NodeId::new(entry.id.clone()),
            url: entry.ws_url(),
            password: entry.password.clone(),
            region: entry.region.clone(),
            user_id: user_id.to_string(),
            shard_count,
        }
    }

    /// Build the websocket upgrade request with the identity headers.
    pub(crate) fn handshake_request(&self) -> Result<Request, LinkError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| LinkError::Handshake(format!("invalid url {}: {e}", self.url)))?;

        let headers = request.headers_mut();
        headers.insert("authorization", header_value("Authorization", &self.password)?);
        headers.insert("num-shards", HeaderValue::from(self.shard_count));
        headers.insert("user-id", header_value("User-Id", &self.user_id)?);
        headers.insert(
            "client-name",
            HeaderValue::from_static(concat!("tonearm/", env!("CARGO_PKG_VERSION"))),
        );
        Ok(request)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, LinkError> {
    HeaderValue::from_str(value).map_err(|e| LinkError::Handshake(format!("bad {name} header: {e}")))
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Point-in-time view of a node used by the selection policy.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub region: Option<String>,
    pub connected: bool,
    pub draining: bool,
    pub players: u32,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Signals emitted by one node connection.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Socket opened and authenticated.
    Ready,
    /// Socket closed or failed to open; a reconnect is scheduled.
    Disconnected { reason: String },
    /// Non-fatal: dropped send, malformed frame, failed connect.
    Error(String),
    /// Load snapshot replaced.
    Stats(NodeStats),
    /// Anything guild-scoped, for the router.
    Message(IncomingMessage),
}
