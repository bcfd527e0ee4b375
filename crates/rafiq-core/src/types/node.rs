//! Cluster node identity and addressing

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Unique identifier for a cluster node
pub type NodeId = String;

/// A configured cluster member. The member list is static and identical
/// on every node; only liveness is dynamic, and each node tracks that
/// locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique node identifier
    pub id: NodeId,
    /// Hostname or IP the node listens on
    pub host: String,
    /// Port the node listens on
    pub port: u16,
}

impl Member {
    pub fn new(id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }

    /// WebSocket URL peers dial to reach this member
    pub fn peer_url(&self) -> String {
        format!("ws://{}:{}/cluster/ws", self.host, self.port)
    }

    /// WebSocket URL clients dial to reach this member
    pub fn client_url(&self) -> String {
        format!("ws://{}:{}/client/ws", self.host, self.port)
    }
}

/// Wall-clock milliseconds since the epoch, the timestamp unit used on
/// the wire for heartbeats and snapshots.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
