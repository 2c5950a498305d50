//! Connections to individual audio nodes.
//!
//! A `NodeConnection` owns one websocket, reconnects with capped backoff,
//! and reports everything it sees as `NodeEvent`s. It never buffers
//! commands: ordering and retries are the session's business.

mod backoff;
mod connection;
mod types;

#[cfg(test)]
mod tests;

pub use backoff::{reconnect_delay, ReconnectState, Reconnector};
pub use connection::NodeConnection;
pub use types::{ConnectionState, NodeConfig, NodeEvent, NodeSnapshot};
