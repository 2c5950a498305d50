//! The node pool: owns every node connection, places sessions on nodes and
//! moves them when a node drains or drops.

mod selection;
mod types;


use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tonearm_common::{GuildId, LinkError, NodeId};
use tonearm_config::{PoolConfig, TonearmConfig};
use tracing::{debug, info, warn};

use crate::gateway::{VoiceCredentials, VoiceGateway};
use crate::node::{NodeConfig, NodeConnection};
use crate::router::route_node_events;
use crate::session::{Session, SessionState};

pub use selection::select_node;
pub(crate) use types::emit;
pub use types::{JoinOptions, PoolEvent};
use types::PendingVoice;

/// Handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct NodePool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    /// Configuration order, no duplicate ids.
    nodes: Vec<Arc<NodeConnection>>,
    sessions: RwLock<HashMap<GuildId, Session>>,
    voice: Mutex<HashMap<GuildId, PendingVoice>>,
    gateway: Arc<dyn VoiceGateway>,
    events: mpsc::Sender<PoolEvent>,
    pub(crate) settings: PoolConfig,
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePool")
            .field("nodes", &self.inner.nodes)
            .finish_non_exhaustive()
    }
}

impl NodePool {
    /// Build the pool and start one event router per node. Nodes stay
    /// disconnected until [`NodePool::connect`]. Must run inside a tokio
    /// runtime.
    pub fn new(
        nodes: Vec<NodeConfig>,
        settings: PoolConfig,
        gateway: Arc<dyn VoiceGateway>,
    ) -> (Self, mpsc::Receiver<PoolEvent>) {
        let buffer = settings.event_buffer.max(1);
        let (events, events_rx) = mpsc::channel(buffer);

        let mut connections: Vec<Arc<NodeConnection>> = Vec::with_capacity(nodes.len());
        let mut receivers = Vec::with_capacity(nodes.len());
        for config in nodes {
            if connections.iter().any(|n| n.id() == &config.id) {
                warn!(node = %config.id, "Duplicate node id, skipping");
                continue;
            }
            let (node, rx) = NodeConnection::new(config, buffer);
            receivers.push((node.id().clone(), rx));
            connections.push(node);
        }

        let inner = Arc::new(PoolInner {
            nodes: connections,
            sessions: RwLock::new(HashMap::new()),
            voice: Mutex::new(HashMap::new()),
            gateway,
            events,
            settings,
        });
        for (node_id, rx) in receivers {
            tokio::spawn(route_node_events(Arc::downgrade(&inner), node_id, rx));
        }

        info!(nodes = inner.nodes.len(), "Node pool created");
        (Self { inner }, events_rx)
    }

    pub fn from_config(
        config: &TonearmConfig,
        gateway: Arc<dyn VoiceGateway>,
    ) -> (Self, mpsc::Receiver<PoolEvent>) {
        let nodes = config
            .nodes
            .iter()
            .map(|entry| NodeConfig::from_entry(entry, &config.user_id, config.shard_count))
            .collect();
        Self::new(nodes, config.pool.clone(), gateway)
    }

    /// Open every node connection.
    pub async fn connect(&self) {
        for node in &self.inner.nodes {
            node.connect().await;
        }
    }

    pub fn nodes(&self) -> &[Arc<NodeConnection>] {
        &self.inner.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<Arc<NodeConnection>> {
        self.inner.node(id)
    }

    /// Stop placing new sessions on a node. Call [`NodePool::evacuate`] to
    /// move the ones already there.
    pub async fn set_draining(&self, id: &NodeId, draining: bool) -> Result<(), LinkError> {
        let node = self
            .node(id)
            .ok_or_else(|| LinkError::UnknownNode(id.clone()))?;
        node.set_draining(draining).await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Get or create the session for a guild and ask the gateway to join
    /// the voice channel.
    pub async fn join(
        &self,
        guild_id: impl Into<GuildId>,
        options: JoinOptions,
    ) -> Result<Session, LinkError> {
        let guild_id = guild_id.into();

        if let Some(existing) = self.session(&guild_id).await {
            let channel = existing.state().await.channel_id;
            if channel.as_deref() != Some(options.channel_id.as_str()) {
                existing.switch_channel(options.channel_id, true).await?;
            }
            return Ok(existing);
        }

        let node = match &options.node {
            Some(id) => {
                let node = self
                    .node(id)
                    .ok_or_else(|| LinkError::UnknownNode(id.clone()))?;
                let snapshot = node.snapshot().await;
                if !snapshot.connected || snapshot.draining {
                    return Err(LinkError::NoNodeAvailable);
                }
                node
            }
            None => self
                .inner
                .select_node(options.region.as_deref(), None)
                .await
                .ok_or(LinkError::NoNodeAvailable)?,
        };

        let mut state = SessionState::new(Arc::clone(&node));
        state.channel_id = Some(options.channel_id.clone());
        state.region = options.region.clone();
        state.self_mute = options.self_mute;
        state.self_deaf = options.self_deaf;
        let session = Session::new(
            guild_id.clone(),
            state,
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.gateway),
            self.inner.events.clone(),
        );

        self.inner
            .gateway
            .update_voice_state(
                &guild_id,
                Some(&options.channel_id),
                options.self_mute,
                options.self_deaf,
            )
            .await?;

        let session = self
            .inner
            .sessions
            .write()
            .await
            .entry(guild_id.clone())
            .or_insert(session)
            .clone();
        info!(guild = %guild_id, node = %node.id(), channel = %options.channel_id, "Session created");

        self.try_handshake(&guild_id).await?;
        Ok(session)
    }

    /// Destroy the guild's session and leave voice.
    pub async fn leave(&self, guild_id: &GuildId) -> Result<(), LinkError> {
        let session = self.inner.sessions.write().await.remove(guild_id);
        self.inner.voice.lock().await.remove(guild_id);
        let session = session.ok_or_else(|| LinkError::UnknownSession(guild_id.clone()))?;

        session.disconnect("left voice").await;
        self.inner
            .gateway
            .update_voice_state(guild_id, None, false, false)
            .await
    }

    pub async fn session(&self, guild_id: &GuildId) -> Option<Session> {
        self.inner.session(guild_id).await
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.read().await.values().cloned().collect()
    }

    /// Sessions currently bound to `node_id`.
    pub async fn sessions_on(&self, node_id: &NodeId) -> Vec<Session> {
        self.inner.sessions_on(node_id).await
    }

    pub async fn switch_node(&self, guild_id: &GuildId) -> Result<NodeId, LinkError> {
        let session = self
            .session(guild_id)
            .await
            .ok_or_else(|| LinkError::UnknownSession(guild_id.clone()))?;
        session.switch_node().await
    }

    /// Move every session off `node_id`. Returns how many moved.
    pub async fn evacuate(&self, node_id: &NodeId) -> usize {
        self.inner.evacuate(node_id).await
    }

    // -----------------------------------------------------------------------
    // Gateway voice events
    // -----------------------------------------------------------------------

    /// The bot's own voice state changed. `channel_id == None` means it left
    /// voice, which ends the session.
    pub async fn voice_state_update(
        &self,
        guild_id: &GuildId,
        session_id: impl Into<String>,
        channel_id: Option<String>,
    ) -> Result<(), LinkError> {
        let session_id = session_id.into();

        let Some(channel_id) = channel_id else {
            self.inner.voice.lock().await.remove(guild_id);
            if let Some(session) = self.session(guild_id).await {
                session.disconnect("left voice channel").await;
            }
            return Ok(());
        };

        let changed = {
            let mut voice = self.inner.voice.lock().await;
            let pending = voice.entry(guild_id.clone()).or_default();
            let changed = pending.session_id.as_deref() != Some(session_id.as_str());
            pending.session_id = Some(session_id);
            changed
        };

        if let Some(session) = self.session(guild_id).await {
            let current = session.state().await.channel_id;
            if current.as_deref() != Some(channel_id.as_str()) {
                session.switch_channel(channel_id, false).await?;
            }
        }
        if changed {
            self.try_handshake(guild_id).await?;
        }
        Ok(())
    }

    /// A voice server was assigned. Completes the handshake once the session
    /// id is known.
    pub async fn voice_server_update(
        &self,
        guild_id: &GuildId,
        event: serde_json::Value,
    ) -> Result<(), LinkError> {
        self.inner
            .voice
            .lock()
            .await
            .entry(guild_id.clone())
            .or_default()
            .event = Some(event);
        self.try_handshake(guild_id).await
    }

    async fn try_handshake(&self, guild_id: &GuildId) -> Result<(), LinkError> {
        let credentials = {
            let voice = self.inner.voice.lock().await;
            match voice.get(guild_id) {
                Some(PendingVoice {
                    session_id: Some(session_id),
                    event: Some(event),
                }) => VoiceCredentials {
                    session_id: session_id.clone(),
                    event: event.clone(),
                },
                _ => return Ok(()),
            }
        };
        let Some(session) = self.session(guild_id).await else {
            debug!(guild = %guild_id, "Voice credentials ready before join");
            return Ok(());
        };
        session.connect(credentials).await
    }

    /// Disconnect every session and close every node for good.
    pub async fn destroy(&self) {
        for session in self.sessions().await {
            session.disconnect("pool destroyed").await;
        }
        self.inner.sessions.write().await.clear();
        self.inner.voice.lock().await.clear();
        for node in &self.inner.nodes {
            node.destroy().await;
        }
        info!("Node pool destroyed");
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<PoolInner> {
        &self.inner
    }
}

impl PoolInner {
    pub(crate) fn node(&self, id: &NodeId) -> Option<Arc<NodeConnection>> {
        self.nodes.iter().find(|n| n.id() == id).cloned()
    }

    pub(crate) async fn session(&self, guild_id: &GuildId) -> Option<Session> {
        self.sessions.read().await.get(guild_id).cloned()
    }

    /// Run the selection policy against live node snapshots.
    pub(crate) async fn select_node(
        &self,
        region: Option<&str>,
        exclude: Option<&NodeId>,
    ) -> Option<Arc<NodeConnection>> {
        let mut snapshots = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            snapshots.push(node.snapshot().await);
        }
        select_node(&snapshots, region, exclude).map(|i| Arc::clone(&self.nodes[i]))
    }

    pub(crate) async fn sessions_on(&self, node_id: &NodeId) -> Vec<Session> {
        let sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        let mut bound = Vec::new();
        for session in sessions {
            if session.node().await.id() == node_id {
                bound.push(session);
            }
        }
        bound
    }

    pub(crate) async fn evacuate(&self, node_id: &NodeId) -> usize {
        let mut moved = 0;
        for session in self.sessions_on(node_id).await {
            match session.switch_node().await {
                Ok(_) => moved += 1,
                Err(e) => {
                    warn!(guild = %session.guild_id(), node = %node_id, error = %e, "Could not move session")
                }
            }
        }
        info!(node = %node_id, moved, "Node evacuated");
        moved
    }

    /// Drop the binding if it still points at this session.
    pub(crate) async fn forget_session(&self, session: &Session) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(session.guild_id())
            .is_some_and(|s| s.ptr_eq(session))
        {
            sessions.remove(session.guild_id());
        }
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        emit(&self.events, event);
    }
}
