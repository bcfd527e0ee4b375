//! Configuration for Rafiq
//!
//! Cluster membership is static: every node ships the same member list
//! and is told which entry it is. All protocol timings are tunable here
//! so deployments never need a code change to adjust them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::Member;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RafiqConfig {
    /// Identity of this node; must match one entry in `cluster.members`
    pub node_id: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RafiqConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InvalidConfig(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self {
            node_id: String::new(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            cluster: ClusterConfig::default(),
            logging: LoggingConfig::default(),
        };

        if let Ok(id) = std::env::var("RAFIQ_NODE_ID") {
            config.node_id = id;
        }
        if let Ok(addr) = std::env::var("RAFIQ_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("RAFIQ_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(dir) = std::env::var("RAFIQ_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("RAFIQ_LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    /// Validate the configuration. An identity that does not appear in
    /// the member list is fatal: the node cannot know its place in the
    /// partition ring.
    pub fn validate(&self) -> crate::Result<()> {
        if self.node_id.is_empty() {
            return Err(crate::Error::InvalidConfig("node_id is not set".into()));
        }
        if self.cluster.members.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "cluster.members must list at least one node".into(),
            ));
        }
        if !self.cluster.members.iter().any(|m| m.id == self.node_id) {
            return Err(crate::Error::UnknownNode(self.node_id.clone()));
        }
        if self.cluster.heartbeat_timeout_ms < 2 * self.cluster.heartbeat_interval_ms {
            return Err(crate::Error::InvalidConfig(format!(
                "heartbeat_timeout_ms ({}) must be at least twice heartbeat_interval_ms ({})",
                self.cluster.heartbeat_timeout_ms, self.cluster.heartbeat_interval_ms
            )));
        }
        if self.cluster.max_store_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_store_size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// All configured members except this node, in configured order.
    pub fn peers(&self) -> Vec<Member> {
        self.cluster
            .members
            .iter()
            .filter(|m| m.id != self.node_id)
            .cloned()
            .collect()
    }

    /// All configured member ids, in configured order. This ordering is
    /// the canonical one used for partition assignment on every node.
    pub fn member_ids(&self) -> Vec<String> {
        self.cluster.members.iter().map(|m| m.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the per-node store blob
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Static member list; identical on every node, order matters
    #[serde(default)]
    pub members: Vec<Member>,

    /// How often this node emits heartbeats to connected peers
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Heartbeat gap after which a peer is declared failed
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// How often the liveness check runs
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Warm-up delay before dialing peers, so every node has bound its
    /// listening port first
    #[serde(default = "default_peer_connect_delay_ms")]
    pub peer_connect_delay_ms: u64,

    /// Delay before requesting snapshots from peers after startup
    #[serde(default = "default_snapshot_request_delay_ms")]
    pub snapshot_request_delay_ms: u64,

    /// Stagger before trying the secondary on a forwarded get
    #[serde(default = "default_get_stagger_ms")]
    pub get_stagger_ms: u64,

    /// Overall deadline for a forwarded get before answering absent
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,

    /// Maximum number of entries the local store will hold
    #[serde(default = "default_max_store_size")]
    pub max_store_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            check_interval_ms: default_check_interval_ms(),
            peer_connect_delay_ms: default_peer_connect_delay_ms(),
            snapshot_request_delay_ms: default_snapshot_request_delay_ms(),
            get_stagger_ms: default_get_stagger_ms(),
            get_timeout_ms: default_get_timeout_ms(),
            max_store_size: default_max_store_size(),
        }
    }
}

impl ClusterConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn peer_connect_delay(&self) -> Duration {
        Duration::from_millis(self.peer_connect_delay_ms)
    }

    pub fn snapshot_request_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_request_delay_ms)
    }

    pub fn get_stagger(&self) -> Duration {
        Duration::from_millis(self.get_stagger_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    crate::DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_heartbeat_timeout_ms() -> u64 {
    crate::DEFAULT_HEARTBEAT_TIMEOUT_MS
}

fn default_check_interval_ms() -> u64 {
    crate::DEFAULT_CHECK_INTERVAL_MS
}

fn default_peer_connect_delay_ms() -> u64 {
    crate::DEFAULT_PEER_CONNECT_DELAY_MS
}

fn default_snapshot_request_delay_ms() -> u64 {
    crate::DEFAULT_SNAPSHOT_REQUEST_DELAY_MS
}

fn default_get_stagger_ms() -> u64 {
    crate::DEFAULT_GET_STAGGER_MS
}

fn default_get_timeout_ms() -> u64 {
    crate::DEFAULT_GET_TIMEOUT_MS
}

fn default_max_store_size() -> usize {
    crate::DEFAULT_MAX_STORE_SIZE
}
