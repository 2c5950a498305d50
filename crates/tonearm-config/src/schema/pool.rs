use serde::{Deserialize, Serialize};

/// Pool behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Move sessions off a node as soon as its socket closes.
    pub failover_on_disconnect: bool,
    /// Capacity of the event channels handed to the application.
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failover_on_disconnect: true,
            event_buffer: 256,
        }
    }
}
