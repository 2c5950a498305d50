//! The chat-platform voice gateway, as seen from the pool.

use async_trait::async_trait;
use tonearm_common::{GuildId, LinkError};

/// Moves the bot's own voice presence. Implemented by the application on
/// top of its gateway client.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join `channel_id`, or leave voice in this guild when it is `None`.
    async fn update_voice_state(
        &self,
        guild_id: &GuildId,
        channel_id: Option<&str>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<(), LinkError>;
}

/// The two halves of a voice handshake, as delivered by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceCredentials {
    /// From the bot's own voice-state update.
    pub session_id: String,
    /// The raw voice-server update (token, endpoint, guild id).
    pub event: serde_json::Value,
}
