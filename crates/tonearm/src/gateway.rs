//! Stand-in voice gateway for running the pool on its own.

use async_trait::async_trait;
use tonearm_common::{GuildId, LinkError};
use tonearm_link::VoiceGateway;
use tracing::info;

/// Logs voice-state requests instead of sending them anywhere. A bot
/// embedding the pool supplies its own gateway client.
pub struct LoggingGateway;

#[async_trait]
impl VoiceGateway for LoggingGateway {
    async fn update_voice_state(
        &self,
        guild_id: &GuildId,
        channel_id: Option<&str>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<(), LinkError> {
        info!(
            guild = %guild_id,
            channel = channel_id.unwrap_or("-"),
            self_mute,
            self_deaf,
            "Voice state update requested"
        );
        Ok(())
    }
}
