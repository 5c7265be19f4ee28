use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::Record;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    Memory,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./records.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Records upserted into the store once at start-up
    #[serde(default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NodeConfig {
    /// Socket addresses to listen on (`ip:port` or `/ip4/../tcp/..`)
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,

    /// Protocol label negotiated on every stream
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            protocol: default_protocol(),
        }
    }
}

fn default_listen() -> Vec<String> {
    vec![crate::util::get_listen_addr()]
}

fn default_protocol() -> String {
    crate::util::PROTOCOL_ID.to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SessionConfig {
    /// Pause after each decoded inbound snapshot
    #[serde(default = "default_receive_throttle_ms")]
    pub receive_throttle_ms: u64,
}

impl SessionConfig {
    pub fn receive_throttle(&self) -> Duration {
        Duration::from_millis(self.receive_throttle_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_throttle_ms: default_receive_throttle_ms(),
        }
    }
}

fn default_receive_throttle_ms() -> u64 {
    1000
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
