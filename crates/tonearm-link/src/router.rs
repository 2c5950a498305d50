//! Per-node event routing.
//!
//! One task per node drains its `NodeEvent` stream: node-level signals
//! become `PoolEvent`s, guild-scoped messages are dispatched to the session
//! bound to that guild.

use std::sync::Weak;

use tokio::sync::mpsc;
use tonearm_common::NodeId;
use tracing::{debug, warn};

use crate::node::NodeEvent;
use crate::pool::{PoolEvent, PoolInner};
use crate::protocol::{IncomingMessage, TrackEvent};

pub(crate) async fn route_node_events(
    pool: Weak<PoolInner>,
    node_id: NodeId,
    mut events: mpsc::Receiver<NodeEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };
        match event {
            NodeEvent::Ready => pool.emit(PoolEvent::NodeReady(node_id.clone())),
            NodeEvent::Disconnected { reason } => {
                pool.emit(PoolEvent::NodeDisconnected {
                    node: node_id.clone(),
                    reason,
                });
                if pool.settings.failover_on_disconnect {
                    pool.evacuate(&node_id).await;
                }
            }
            NodeEvent::Error(message) => pool.emit(PoolEvent::NodeError {
                node: node_id.clone(),
                message,
            }),
            NodeEvent::Stats(stats) => {
                debug!(
                    node = %node_id,
                    players = stats.players,
                    playing = stats.playing_players,
                    "Node stats"
                );
            }
            NodeEvent::Message(message) => dispatch(&pool, &node_id, message).await,
        }
    }
    debug!(node = %node_id, "Event router finished");
}

/// Hand one guild-scoped message to its session.
pub(crate) async fn dispatch(pool: &PoolInner, node_id: &NodeId, message: IncomingMessage) {
    let guild_id = match message.guild_id() {
        Some(guild_id) => guild_id.clone(),
        // Stats are applied by the node itself.
        None => return,
    };

    let Some(session) = pool.session(&guild_id).await else {
        warn!(node = %node_id, guild = %guild_id, "No session for guild, dropping message");
        pool.emit(PoolEvent::Unroutable {
            node: node_id.clone(),
            guild_id,
        });
        return;
    };
    if session.node().await.id() != node_id {
        debug!(node = %node_id, guild = %guild_id, "Ignoring message from previous node");
        return;
    }

    match message {
        IncomingMessage::PlayerUpdate { state, .. } => session.state_update(state).await,
        IncomingMessage::Event(TrackEvent::End(end)) => session.on_track_end(end).await,
        IncomingMessage::Event(TrackEvent::Exception(exception)) => {
            session.on_track_exception(exception).await
        }
        IncomingMessage::Event(TrackEvent::Stuck(stuck)) => session.on_track_stuck(stuck).await,
        IncomingMessage::Stats(_) => {}
    }
}
