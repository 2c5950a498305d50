//! Shared fixtures for pool and session tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tonearm_common::{GuildId, LinkError, NodeId};
use tonearm_config::PoolConfig;

use crate::gateway::{VoiceCredentials, VoiceGateway};
use crate::node::NodeConfig;
use crate::pool::{NodePool, PoolEvent};
use crate::session::SessionEvent;

const WAIT: Duration = Duration::from_secs(2);

/// One `update_voice_state` call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VoiceCall {
    pub guild_id: GuildId,
    pub channel_id: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// Gateway that records every call.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    calls: Mutex<Vec<VoiceCall>>,
}

impl RecordingGateway {
    pub(crate) fn calls(&self) -> Vec<VoiceCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceGateway for RecordingGateway {
    async fn update_voice_state(
        &self,
        guild_id: &GuildId,
        channel_id: Option<&str>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<(), LinkError> {
        self.calls.lock().unwrap().push(VoiceCall {
            guild_id: guild_id.clone(),
            channel_id: channel_id.map(str::to_string),
            self_mute,
            self_deaf,
        });
        Ok(())
    }
}

/// A pool whose nodes are all attached to in-memory wires.
pub(crate) struct Harness {
    pub pool: NodePool,
    pub events: mpsc::Receiver<PoolEvent>,
    pub gateway: Arc<RecordingGateway>,
    wires: HashMap<NodeId, mpsc::UnboundedReceiver<String>>,
}

pub(crate) async fn pool_with(nodes: &[(&str, Option<&str>)]) -> Harness {
    pool_with_settings(
        nodes,
        PoolConfig {
            failover_on_disconnect: false,
            ..PoolConfig::default()
        },
    )
    .await
}

pub(crate) async fn pool_with_settings(nodes: &[(&str, Option<&str>)], settings: PoolConfig) -> Harness {
    let configs = nodes
        .iter()
        .map(|(id, region)| NodeConfig {
            id: NodeId::from(*id),
            url: "ws://127.0.0.1:1".into(),
            password: "pw".into(),
            region: region.map(str::to_string),
            user_id: "1001".into(),
            shard_count: 1,
        })
        .collect();
    let gateway = Arc::new(RecordingGateway::default());
    let (pool, events) = NodePool::new(configs, settings, gateway.clone());

    let mut wires = HashMap::new();
    for node in pool.nodes() {
        wires.insert(node.id().clone(), node.attach_for_test().await);
    }
    Harness {
        pool,
        events,
        gateway,
        wires,
    }
}

impl Harness {
    /// Next frame written to `node`, parsed.
    pub(crate) async fn frame(&mut self, node: &str) -> Value {
        let wire = self
            .wires
            .get_mut(&NodeId::from(node))
            .expect("unknown node");
        let raw = tokio::time::timeout(WAIT, wire.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("wire closed");
        serde_json::from_str(&raw).expect("frame is json")
    }

    /// Let spawned tasks run, then return everything written to `node`.
    pub(crate) async fn drain_frames(&mut self, node: &str) -> Vec<Value> {
        settle().await;
        let wire = self
            .wires
            .get_mut(&NodeId::from(node))
            .expect("unknown node");
        let mut frames = Vec::new();
        while let Ok(raw) = wire.try_recv() {
            frames.push(serde_json::from_str(&raw).expect("frame is json"));
        }
        frames
    }

    pub(crate) async fn event(&mut self) -> PoolEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for pool event")
            .expect("event channel closed")
    }

    /// Next session event, skipping node-level ones.
    pub(crate) async fn session_event(&mut self) -> SessionEvent {
        loop {
            if let PoolEvent::Session { event, .. } = self.event().await {
                return event;
            }
        }
    }
}

/// Give every ready task a few turns.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn credentials() -> VoiceCredentials {
    VoiceCredentials {
        session_id: "voice-session".into(),
        event: json!({"token": "tok", "endpoint": "voice.example:443", "guild_id": "7"}),
    }
}
