//! Session state, lifecycle phases and events.

use std::sync::Arc;

use tokio::time::Instant;
use tonearm_common::NodeId;

use crate::gateway::VoiceCredentials;
use crate::node::NodeConnection;
use crate::protocol::{EndReason, PlayerState, TrackException};

/// Where a session is in its lifecycle. Derived from the flags in
/// [`SessionState`]; `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Ready,
    Playing,
    Paused,
    Stopped,
    Destroyed,
}

/// Everything a session knows about its player.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// The node currently serving this guild. Always exactly one.
    pub node: Arc<NodeConnection>,
    pub channel_id: Option<String>,
    pub region: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
    pub voice: Option<VoiceCredentials>,
    pub connecting: bool,
    pub ready: bool,
    pub playing: bool,
    pub paused: bool,
    pub stopped: bool,
    pub destroyed: bool,
    pub track: Option<String>,
    pub previous_track: Option<String>,
    pub volume: Option<u16>,
    /// Last `playerUpdate` from the node.
    pub player: PlayerState,
    /// When `player` was received.
    pub updated_at: Option<Instant>,
    /// When the current track was sent.
    pub started_at: Option<Instant>,
}

impl SessionState {
    pub(crate) fn new(node: Arc<NodeConnection>) -> Self {
        Self {
            node,
            channel_id: None,
            region: None,
            self_mute: false,
            self_deaf: false,
            voice: None,
            connecting: false,
            ready: false,
            playing: false,
            paused: false,
            stopped: false,
            destroyed: false,
            track: None,
            previous_track: None,
            volume: None,
            player: PlayerState::default(),
            updated_at: None,
            started_at: None,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.node.id()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.destroyed {
            SessionPhase::Destroyed
        } else if self.paused {
            SessionPhase::Paused
        } else if self.playing {
            SessionPhase::Playing
        } else if self.stopped {
            SessionPhase::Stopped
        } else if self.ready {
            SessionPhase::Ready
        } else if self.connecting {
            SessionPhase::Connecting
        } else {
            SessionPhase::Idle
        }
    }

    /// Estimated playback position in ms: the last reported position plus
    /// the time since it was reported, while actually playing.
    pub fn position(&self) -> u64 {
        match self.updated_at {
            Some(at) if self.playing && !self.paused => {
                self.player.position + at.elapsed().as_millis() as u64
            }
            _ => self.player.position,
        }
    }

    /// Move the current track into `previous_track` and mark playback over.
    pub(crate) fn finish_track(&mut self) {
        if let Some(track) = self.track.take() {
            self.previous_track = Some(track);
        }
        self.playing = false;
        self.stopped = true;
    }
}

/// Signals from one session, delivered on the pool's event channel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The voice handshake reached the node.
    Ready,
    End { track: String, reason: EndReason },
    /// The node failed to play a track. Playback flags are untouched.
    Error(TrackException),
    NodeSwitched { from: NodeId, to: NodeId },
    Disconnected { reason: String },
}
