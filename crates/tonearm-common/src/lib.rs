pub mod errors;
pub mod id;

pub use errors::{ConfigError, LinkError, TonearmError};
pub use id::{GuildId, NodeId};

pub type Result<T> = std::result::Result<T, TonearmError>;
