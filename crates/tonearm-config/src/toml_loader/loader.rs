//! Core TOML config loading: read from path or platform default.

use crate::schema::TonearmConfig;
use std::path::Path;
use tonearm_common::ConfigError;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Load config from a specific TOML file path.
///
/// Missing fields take serde defaults. Validation is left to the caller.
pub fn load_from_path(path: &Path) -> Result<TonearmConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: TonearmConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    info!(nodes = config.nodes.len(), "loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/tonearm/config.toml`
///
/// If the file does not exist, writes the commented template and returns
/// its contents.
pub fn load_default() -> Result<TonearmConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            warn!("set user_id in {} before starting tonearm", path.display());
            load_from_path(&path)
        }
        other => other,
    }
}
