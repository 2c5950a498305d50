//! Client side of a pool of audio nodes.
//!
//! [`NodePool`] owns one [`NodeConnection`] per configured node, places each
//! guild's [`Session`] on the best node, and moves sessions when a node
//! drains or drops. Everything the pool observes is reported on a
//! [`PoolEvent`] channel.

pub mod gateway;
pub mod node;
pub mod pool;
pub mod protocol;
mod router;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use gateway::{VoiceCredentials, VoiceGateway};
pub use node::{ConnectionState, NodeConfig, NodeConnection, NodeEvent, NodeSnapshot, ReconnectState};
pub use pool::{JoinOptions, NodePool, PoolEvent};
pub use protocol::{EndReason, EqualizerBand, OutgoingCommand, PlayOptions};
pub use session::{Session, SessionEvent, SessionPhase, SessionState};
