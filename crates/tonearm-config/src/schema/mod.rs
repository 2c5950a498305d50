//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod node;
mod pool;

pub use logging::*;
pub use node::*;
pub use pool::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TonearmConfig {
    /// Bot user id sent to every node as `User-Id`.
    pub user_id: String,
    /// Shard count sent to every node as `Num-Shards`.
    pub shard_count: u32,
    pub nodes: Vec<NodeEntry>,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

impl Default for TonearmConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            shard_count: 1,
            nodes: Vec::new(),
            pool: PoolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
