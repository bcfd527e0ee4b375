//! Peer-to-peer message schema
//!
//! One JSON-encoded message per WebSocket text frame. The schema is
//! transport-agnostic: anything that delivers whole frames in order per
//! connection can carry it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::node::NodeId;

/// Messages exchanged between cluster nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Periodic liveness signal
    Heartbeat { from: NodeId, timestamp: i64 },

    /// A put forwarded from a non-owner to the key's primary
    Put { key: String, value: Value },

    /// A write pushed from a primary to its secondary, fire-and-forget
    Replicate {
        key: String,
        value: Value,
        from_peer: NodeId,
    },

    /// A delete pushed from a primary to its secondary
    ReplicateDelete { key: String, from_peer: NodeId },

    /// A get forwarded to a node believed to own the key
    Get { key: String },

    /// Reply to a forwarded get; `value` is `None` when absent
    Value {
        key: String,
        value: Option<Value>,
    },

    /// Delete broadcast to every connected peer. `is_broadcast` marks
    /// relayed copies so receivers never re-broadcast (depth exactly 1).
    Delete { key: String, is_broadcast: bool },

    /// Ask a peer for its full store
    RequestSnapshot { requester: NodeId, timestamp: i64 },

    /// Full-store transfer used for reconciliation after (re)connect
    Snapshot {
        to: NodeId,
        from: NodeId,
        data: HashMap<String, Value>,
        timestamp: i64,
    },
}

impl PeerMessage {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Heartbeat { .. } => "heartbeat",
            PeerMessage::Put { .. } => "put",
            PeerMessage::Replicate { .. } => "replicate",
            PeerMessage::ReplicateDelete { .. } => "replicate_delete",
            PeerMessage::Get { .. } => "get",
            PeerMessage::Value { .. } => "value",
            PeerMessage::Delete { .. } => "delete",
            PeerMessage::RequestSnapshot { .. } => "request_snapshot",
            PeerMessage::Snapshot { .. } => "snapshot",
        }
    }
}
