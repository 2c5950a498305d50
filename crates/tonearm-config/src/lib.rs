//! Tonearm configuration.
//!
//! TOML-based configuration for the node pool. All sections use serde
//! defaults so a file only has to list the nodes it connects to.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tonearm_config::load_config;
//!
//! let config = load_config().expect("failed to load config");
//! println!("{} node(s) configured", config.nodes.len());
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{LoggingConfig, NodeEntry, PoolConfig, TonearmConfig};

use std::path::Path;

use tonearm_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// A missing file is created from the commented template first.
pub fn load_config() -> Result<TonearmConfig, ConfigError> {
    let path = toml_loader::default_config_path()?;
    let config = toml_loader::load_default()?;
    validate_file(&config, &path)?;
    Ok(config)
}

/// Load config from an explicit path and validate it.
pub fn load_config_from(path: &Path) -> Result<TonearmConfig, ConfigError> {
    let config = toml_loader::load_from_path(path)?;
    validate_file(&config, path)?;
    Ok(config)
}

/// Validate, pointing at the file when the required `user_id` is unset.
fn validate_file(config: &TonearmConfig, path: &Path) -> Result<(), ConfigError> {
    validation::validate(config).map_err(|e| match e {
        ConfigError::ValidationError(message) if config.user_id.trim().is_empty() => {
            ConfigError::ValidationError(format!(
                "{message} (set user_id to the bot's user id in {})",
                path.display()
            ))
        }
        other => other,
    })
}
