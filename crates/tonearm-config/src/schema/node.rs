use serde::{Deserialize, Serialize};

/// One `[[nodes]]` entry: where an audio node lives and how to authenticate.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeEntry {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Voice region this node serves best, e.g. `"us-east"`.
    pub region: Option<String>,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
}

impl std::fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEntry")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("region", &self.region)
            .field("secure", &self.secure)
            .finish()
    }
}

impl Default for NodeEntry {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: "localhost".into(),
            port: 2333,
            password: "youshallnotpass".into(),
            region: None,
            secure: false,
        }
    }
}

impl NodeEntry {
    /// Websocket URL for this node.
    pub fn ws_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}
