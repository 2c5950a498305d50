//! Full configuration validation.
//!
//! Each check pushes a message instead of returning early, so a broken
//! file reports every problem at once in a single `ConfigError`.

mod helpers;


use std::collections::HashSet;

use crate::schema::{TonearmConfig, LOG_LEVELS};
use helpers::{validate_non_empty, validate_range};
use tonearm_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &TonearmConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_non_empty(&mut errors, "user_id", &config.user_id);
    validate_range(&mut errors, "shard_count", config.shard_count as u64, 1, u32::MAX as u64);
    validate_nodes(&mut errors, config);
    validate_range(
        &mut errors,
        "pool.event_buffer",
        config.pool.event_buffer as u64,
        16,
        65536,
    );
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "logging.level = {:?} is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_nodes(errors: &mut Vec<String>, config: &TonearmConfig) {
    if config.nodes.is_empty() {
        errors.push("nodes must list at least one node".into());
        return;
    }

    let mut seen = HashSet::new();
    for (i, node) in config.nodes.iter().enumerate() {
        validate_non_empty(errors, &format!("nodes[{i}].id"), &node.id);
        validate_non_empty(errors, &format!("nodes[{i}].host"), &node.host);
        if node.port == 0 {
            errors.push(format!("nodes[{i}].port must not be 0"));
        }
        if !node.id.is_empty() && !seen.insert(node.id.as_str()) {
            errors.push(format!("nodes[{i}].id = {:?} is a duplicate", node.id));
        }
    }
}
