use std::path::PathBuf;

use crate::id::{GuildId, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures surfaced by the node pool and its sessions.
///
/// Transport problems never show up here; they are reported as node
/// events and handled by the reconnect loop.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no node available")]
    NoNodeAvailable,

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("no session for guild {0}")]
    UnknownSession(GuildId),

    #[error("session for guild {0} is destroyed")]
    SessionDestroyed(GuildId),

    #[error("invalid equalizer band {band} (gain {gain})")]
    InvalidEqualizer { band: u8, gain: f32 },

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("voice gateway error: {0}")]
    Gateway(String),
}

/// Why the `tonearm` binary exited with an error.
#[derive(Debug, thiserror::Error)]
pub enum TonearmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("nodes is empty".into());
        assert_eq!(err.to_string(), "config validation error: nodes is empty");
    }

    #[test]
    fn link_error_display() {
        assert_eq!(LinkError::NoNodeAvailable.to_string(), "no node available");

        let err = LinkError::UnknownNode(NodeId::from("eu-1"));
        assert_eq!(err.to_string(), "unknown node: eu-1");

        let err = LinkError::SessionDestroyed(GuildId::from("42"));
        assert_eq!(err.to_string(), "session for guild 42 is destroyed");

        let err = LinkError::InvalidEqualizer { band: 15, gain: 0.5 };
        assert_eq!(err.to_string(), "invalid equalizer band 15 (gain 0.5)");
    }

    #[test]
    fn link_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: LinkError = serde_err.into();
        assert!(matches!(err, LinkError::Serialization(_)));
    }

    #[test]
    fn tonearm_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: TonearmError = config_err.into();
        assert!(matches!(err, TonearmError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn tonearm_error_from_link() {
        let err: TonearmError = LinkError::NoNodeAvailable.into();
        assert!(matches!(err, TonearmError::Link(_)));
        assert_eq!(err.to_string(), "no node available");
    }

    #[test]
    fn tonearm_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Unsupported, "no signal handler");
        let err: TonearmError = io_err.into();
        assert!(matches!(err, TonearmError::Io(_)));
        assert_eq!(err.to_string(), "no signal handler");
    }

    #[test]
    fn io_error_propagates_through_result_alias() {
        fn listen() -> crate::Result<()> {
            Err::<(), _>(std::io::Error::other("ctrl-c listener failed"))?;
            Ok(())
        }
        let err = listen().unwrap_err();
        assert!(matches!(err, TonearmError::Io(_)));
        assert_eq!(err.to_string(), "ctrl-c listener failed");
    }
}
