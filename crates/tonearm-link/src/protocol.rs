//! Wire protocol spoken with audio nodes.
//!
//! Every frame is a JSON object tagged by `op`. Both directions are closed
//! enums: an inbound frame with an `op` or event `type` we do not know is a
//! parse error, reported as a node error and otherwise ignored.

use serde::{Deserialize, Serialize};
use tonearm_common::{GuildId, LinkError};

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Commands sent to a node on behalf of one guild's player.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutgoingCommand {
    /// The voice handshake. Must reach the node before any playback command.
    VoiceUpdate {
        guild_id: GuildId,
        session_id: String,
        event: serde_json::Value,
    },
    Play {
        guild_id: GuildId,
        track: String,
        #[serde(flatten)]
        options: PlayOptions,
    },
    Stop {
        guild_id: GuildId,
    },
    Pause {
        guild_id: GuildId,
        pause: bool,
    },
    Seek {
        guild_id: GuildId,
        position: u64,
    },
    Volume {
        guild_id: GuildId,
        volume: u16,
    },
    Equalizer {
        guild_id: GuildId,
        bands: Vec<EqualizerBand>,
    },
    Destroy {
        guild_id: GuildId,
    },
}

impl OutgoingCommand {
    pub fn guild_id(&self) -> &GuildId {
        match self {
            Self::VoiceUpdate { guild_id, .. }
            | Self::Play { guild_id, .. }
            | Self::Stop { guild_id }
            | Self::Pause { guild_id, .. }
            | Self::Seek { guild_id, .. }
            | Self::Volume { guild_id, .. }
            | Self::Equalizer { guild_id, .. }
            | Self::Destroy { guild_id } => guild_id,
        }
    }

    /// The `op` string this command serializes with.
    pub fn op(&self) -> &'static str {
        match self {
            Self::VoiceUpdate { .. } => "voiceUpdate",
            Self::Play { .. } => "play",
            Self::Stop { .. } => "stop",
            Self::Pause { .. } => "pause",
            Self::Seek { .. } => "seek",
            Self::Volume { .. } => "volume",
            Self::Equalizer { .. } => "equalizer",
            Self::Destroy { .. } => "destroy",
        }
    }
}

/// Caller-supplied options merged into a `play` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    /// Ignore the play if a track is already playing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_replace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<bool>,
}

pub const EQUALIZER_BANDS: u8 = 15;
pub const MIN_GAIN: f32 = -0.25;
pub const MAX_GAIN: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerBand {
    pub band: u8,
    pub gain: f32,
}

impl EqualizerBand {
    pub fn new(band: u8, gain: f32) -> Self {
        Self { band, gain }
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if self.band >= EQUALIZER_BANDS || !(MIN_GAIN..=MAX_GAIN).contains(&self.gain) {
            return Err(LinkError::InvalidEqualizer {
                band: self.band,
                gain: self.gain,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Frames a node pushes to us.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IncomingMessage {
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerState,
    },
    Stats(NodeStats),
    Event(TrackEvent),
}

impl IncomingMessage {
    /// Guild the frame is about. Stats are node-wide and have none.
    pub fn guild_id(&self) -> Option<&GuildId> {
        match self {
            Self::PlayerUpdate { guild_id, .. } => Some(guild_id),
            Self::Event(event) => Some(event.guild_id()),
            Self::Stats(_) => None,
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_incoming(raw: &str) -> Result<IncomingMessage, LinkError> {
    Ok(serde_json::from_str(raw)?)
}

/// Player position report. `time` is the node's wall clock in ms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct PlayerState {
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub time: u64,
}

/// Node load snapshot carried by `op: "stats"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub players: u32,
    pub playing_players: u32,
    #[serde(default)]
    pub uptime: u64,
    #[serde(default)]
    pub memory: Option<MemoryStats>,
    #[serde(default)]
    pub cpu: Option<CpuStats>,
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// Payload of `op: "event"`, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum TrackEvent {
    #[serde(rename = "TrackEndEvent")]
    End(TrackEnd),
    #[serde(rename = "TrackExceptionEvent")]
    Exception(TrackException),
    #[serde(rename = "TrackStuckEvent")]
    Stuck(TrackStuck),
}

impl TrackEvent {
    pub fn guild_id(&self) -> &GuildId {
        match self {
            Self::End(e) => &e.guild_id,
            Self::Exception(e) => &e.guild_id,
            Self::Stuck(e) => &e.guild_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEnd {
    pub guild_id: GuildId,
    pub track: String,
    pub reason: EndReason,
}

/// Why a track ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    /// A new `play` superseded the track; player state already reflects it.
    Replaced,
    Cleanup,
    /// Synthesized locally when a stuck track is stopped.
    #[serde(skip_deserializing)]
    Stuck,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub guild_id: GuildId,
    pub track: String,
    /// Older nodes send a bare message here.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub exception: Option<ExceptionDetail>,
}

impl TrackException {
    pub fn message(&self) -> &str {
        self.exception
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .or(self.error.as_deref())
            .unwrap_or("unknown error")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExceptionDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuck {
    pub guild_id: GuildId,
    pub track: String,
    #[serde(default)]
    pub threshold_ms: u64,
}
