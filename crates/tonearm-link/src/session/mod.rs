//! Per-guild playback sessions.
//!
//! A session is bound to exactly one node at a time. Playback-order
//! commands (`voiceUpdate`, `play`, `stop`) go through a FIFO queue drained
//! by a background task, one command per scheduling turn. Control commands
//! (`pause`, `seek`, `volume`, `equalizer`, `destroy`) go straight to the
//! node.

mod queue;
mod state;


use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::time::Instant;
use tonearm_common::{GuildId, LinkError, NodeId};
use tracing::{debug, info, trace, warn};

use crate::gateway::{VoiceCredentials, VoiceGateway};
use crate::node::NodeConnection;
use crate::pool::{PoolEvent, PoolInner};
use crate::protocol::{
    EndReason, EqualizerBand, OutgoingCommand, PlayOptions, PlayerState, TrackEnd, TrackException,
    TrackStuck,
};

use queue::CommandQueue;
pub use state::{SessionEvent, SessionPhase, SessionState};

/// Handle to one guild's player. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    guild_id: GuildId,
    /// For failover lookups only; the pool owns the session, not the reverse.
    pool: Weak<PoolInner>,
    gateway: Arc<dyn VoiceGateway>,
    events: mpsc::Sender<PoolEvent>,
    state: Mutex<SessionState>,
    queue: Mutex<CommandQueue>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("guild_id", &self.inner.guild_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        guild_id: GuildId,
        state: SessionState,
        pool: Weak<PoolInner>,
        gateway: Arc<dyn VoiceGateway>,
        events: mpsc::Sender<PoolEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                guild_id,
                pool,
                gateway,
                events,
                state: Mutex::new(state),
                queue: Mutex::new(CommandQueue::default()),
            }),
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.inner.guild_id
    }

    /// Copy of the current state.
    pub async fn state(&self) -> SessionState {
        self.inner.state.lock().await.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase()
    }

    /// The node currently serving this session.
    pub async fn node(&self) -> Arc<NodeConnection> {
        Arc::clone(&self.inner.state.lock().await.node)
    }

    pub async fn position(&self) -> u64 {
        self.inner.state.lock().await.position()
    }

    pub async fn is_destroyed(&self) -> bool {
        self.inner.state.lock().await.destroyed
    }

    pub(crate) fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Send the voice handshake ahead of anything already queued.
    pub async fn connect(&self, credentials: VoiceCredentials) -> Result<(), LinkError> {
        let mut state = self.live_state().await?;
        let handshake = self.handshake(&credentials);
        state.voice = Some(credentials);
        if !state.ready {
            state.connecting = true;
        }
        debug!(guild = %self.guild_id(), node = %state.node_id(), "Queueing voice handshake");
        self.enqueue_front(handshake).await;
        Ok(())
    }

    /// Start a track. On a draining node this moves the session to another
    /// node instead and nothing is played.
    pub async fn play(&self, track: impl Into<String>, options: PlayOptions) -> Result<(), LinkError> {
        let track = track.into();
        let mut state = self.live_state().await?;

        if state.node.is_draining().await {
            info!(guild = %self.guild_id(), node = %state.node_id(), "Node draining, failing over instead of playing");
            state.player = PlayerState::default();
            state.updated_at = None;
            self.rebind(&mut state).await?;
            return Ok(());
        }

        if let Some(previous) = state.track.replace(track.clone()) {
            state.previous_track = Some(previous);
        }
        if !state.paused {
            state.playing = true;
        }
        state.stopped = false;
        let now = Instant::now();
        state.started_at = Some(now);
        state.updated_at = Some(now);
        state.player = PlayerState::default();
        if let Some(volume) = options.volume {
            state.volume = Some(volume);
        }
        drop(state);

        self.enqueue(OutgoingCommand::Play {
            guild_id: self.guild_id().clone(),
            track,
            options,
        })
        .await;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), LinkError> {
        let mut state = self.live_state().await?;
        state.finish_track();
        drop(state);

        self.enqueue(OutgoingCommand::Stop {
            guild_id: self.guild_id().clone(),
        })
        .await;
        Ok(())
    }

    /// Pause or resume immediately, bypassing the queue.
    pub async fn set_pause(&self, pause: bool) -> Result<(), LinkError> {
        let mut state = self.live_state().await?;
        state
            .node
            .send(&OutgoingCommand::Pause {
                guild_id: self.guild_id().clone(),
                pause,
            })
            .await;
        state.paused = pause;
        state.playing = !pause && state.track.is_some();
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), LinkError> {
        if self.inner.state.lock().await.paused {
            return Ok(());
        }
        self.set_pause(true).await
    }

    pub async fn resume(&self) -> Result<(), LinkError> {
        if !self.inner.state.lock().await.paused {
            return Ok(());
        }
        self.set_pause(false).await
    }

    pub async fn seek(&self, position: u64) -> Result<(), LinkError> {
        self.send_now(OutgoingCommand::Seek {
            guild_id: self.guild_id().clone(),
            position,
        })
        .await
    }

    pub async fn set_volume(&self, volume: u16) -> Result<(), LinkError> {
        let mut state = self.live_state().await?;
        state
            .node
            .send(&OutgoingCommand::Volume {
                guild_id: self.guild_id().clone(),
                volume,
            })
            .await;
        state.volume = Some(volume);
        Ok(())
    }

    /// Rejects the whole set if any band is out of range.
    pub async fn set_equalizer(&self, bands: Vec<EqualizerBand>) -> Result<(), LinkError> {
        for band in &bands {
            band.validate()?;
        }
        self.send_now(OutgoingCommand::Equalizer {
            guild_id: self.guild_id().clone(),
            bands,
        })
        .await
    }

    /// Tear the player down on the node. Idempotent; the session is unusable
    /// afterwards.
    pub async fn disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut state = self.inner.state.lock().await;
            if state.destroyed {
                return;
            }
            let node = Arc::clone(&state.node);
            if state.paused {
                node.send(&OutgoingCommand::Pause {
                    guild_id: self.guild_id().clone(),
                    pause: false,
                })
                .await;
                state.paused = false;
            }
            node.send(&OutgoingCommand::Destroy {
                guild_id: self.guild_id().clone(),
            })
            .await;
            state.finish_track();
            state.destroyed = true;
            state.ready = false;
            state.connecting = false;
            self.inner.queue.lock().await.clear();
        }

        if let Some(pool) = self.inner.pool.upgrade() {
            pool.forget_session(self).await;
        }
        info!(guild = %self.guild_id(), reason = %reason, "Session disconnected");
        self.inner.emit(SessionEvent::Disconnected { reason });
    }

    /// Remember a new voice channel. With `reactive` the gateway is asked to
    /// move the bot there as well.
    pub async fn switch_channel(
        &self,
        channel_id: impl Into<String>,
        reactive: bool,
    ) -> Result<(), LinkError> {
        let channel_id = channel_id.into();
        let (self_mute, self_deaf) = {
            let mut state = self.live_state().await?;
            state.channel_id = Some(channel_id.clone());
            (state.self_mute, state.self_deaf)
        };
        debug!(guild = %self.guild_id(), channel = %channel_id, reactive, "Switching channel");
        if reactive {
            self.inner
                .gateway
                .update_voice_state(self.guild_id(), Some(&channel_id), self_mute, self_deaf)
                .await?;
        }
        Ok(())
    }

    /// Move to the best other node. Returns the new node's id.
    pub async fn switch_node(&self) -> Result<NodeId, LinkError> {
        let mut state = self.live_state().await?;
        self.rebind(&mut state).await
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    pub(crate) async fn state_update(&self, player: PlayerState) {
        let mut state = self.inner.state.lock().await;
        state.player = player;
        state.updated_at = Some(Instant::now());
    }

    pub(crate) async fn on_track_end(&self, end: TrackEnd) {
        {
            let mut state = self.inner.state.lock().await;
            if end.reason != EndReason::Replaced {
                state.finish_track();
            }
        }
        debug!(guild = %self.guild_id(), reason = ?end.reason, "Track ended");
        self.inner.emit(SessionEvent::End {
            track: end.track,
            reason: end.reason,
        });
    }

    pub(crate) async fn on_track_exception(&self, exception: TrackException) {
        warn!(guild = %self.guild_id(), error = %exception.message(), "Track exception");
        self.inner.emit(SessionEvent::Error(exception));
    }

    /// Stop, then report the end on a later turn so a listener queueing the
    /// next track lands behind the `stop`.
    pub(crate) async fn on_track_stuck(&self, stuck: TrackStuck) {
        warn!(guild = %self.guild_id(), threshold_ms = stuck.threshold_ms, "Track stuck");
        if let Err(e) = self.stop().await {
            debug!(guild = %self.guild_id(), error = %e, "Stuck track on dead session");
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            inner.emit(SessionEvent::End {
                track: stuck.track,
                reason: EndReason::Stuck,
            });
        });
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn live_state(&self) -> Result<MutexGuard<'_, SessionState>, LinkError> {
        let state = self.inner.state.lock().await;
        if state.destroyed {
            return Err(LinkError::SessionDestroyed(self.guild_id().clone()));
        }
        Ok(state)
    }

    fn handshake(&self, credentials: &VoiceCredentials) -> OutgoingCommand {
        OutgoingCommand::VoiceUpdate {
            guild_id: self.guild_id().clone(),
            session_id: credentials.session_id.clone(),
            event: credentials.event.clone(),
        }
    }

    async fn send_now(&self, command: OutgoingCommand) -> Result<(), LinkError> {
        let node = Arc::clone(&self.live_state().await?.node);
        node.send(&command).await;
        Ok(())
    }

    async fn enqueue(&self, command: OutgoingCommand) {
        let start = {
            let mut queue = self.inner.queue.lock().await;
            let start = queue.push_back(command);
            trace!(guild = %self.guild_id(), pending = queue.len(), "Command queued");
            start
        };
        if start {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    async fn enqueue_front(&self, command: OutgoingCommand) {
        let start = self.inner.queue.lock().await.push_front(command);
        if start {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    /// Swap the bound node while the state lock is held, so nobody sees the
    /// session on two nodes or on none.
    async fn rebind(&self, state: &mut SessionState) -> Result<NodeId, LinkError> {
        let pool = self.inner.pool.upgrade().ok_or(LinkError::NoNodeAvailable)?;
        let old = Arc::clone(&state.node);
        let replacement = pool
            .select_node(state.region.as_deref(), Some(old.id()))
            .await
            .ok_or(LinkError::NoNodeAvailable)?;

        state.node = Arc::clone(&replacement);
        state.ready = false;
        if let Some(credentials) = state.voice.clone() {
            state.connecting = true;
            self.enqueue_front(self.handshake(&credentials)).await;
        }

        if old.is_connected().await {
            old.send(&OutgoingCommand::Destroy {
                guild_id: self.guild_id().clone(),
            })
            .await;
        }

        info!(guild = %self.guild_id(), from = %old.id(), to = %replacement.id(), "Session moved to another node");
        self.inner.emit(SessionEvent::NodeSwitched {
            from: old.id().clone(),
            to: replacement.id().clone(),
        });
        Ok(replacement.id().clone())
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        crate::pool::emit(
            &self.events,
            PoolEvent::Session {
                guild_id: self.guild_id.clone(),
                event,
            },
        );
    }

    /// Send one queued command to the node bound under `state`. The guard is
    /// held across the send so a rebind cannot land in between.
    async fn dispatch(&self, mut state: MutexGuard<'_, SessionState>, command: OutgoingCommand) {
        let node = Arc::clone(&state.node);
        let handshake = matches!(command, OutgoingCommand::VoiceUpdate { .. });
        let sent = node.send(&command).await;
        if !(sent && handshake) || state.destroyed || state.ready {
            return;
        }
        state.ready = true;
        state.connecting = false;
        drop(state);
        info!(guild = %self.guild_id, node = %node.id(), "Voice handshake sent");
        self.emit(SessionEvent::Ready);
    }
}

/// Send queued commands one per scheduling turn until the queue is empty.
///
/// Lock order is state, then queue, the same as `rebind`.
async fn drain(inner: Arc<SessionInner>) {
    loop {
        let state = inner.state.lock().await;
        let Some(command) = inner.queue.lock().await.next() else {
            break;
        };
        inner.dispatch(state, command).await;
        tokio::task::yield_now().await;
    }
}
