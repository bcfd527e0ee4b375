//! Client-facing message schema
//!
//! Clients speak JSON over a WebSocket. Requests never carry ids;
//! replies and notifications are correlated by key, and every connected
//! client additionally receives unsolicited change notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Requests a client may issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    Put { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
}

/// Replies and unsolicited notifications sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Full store dump, sent on connect and after snapshot reconciliation
    Store { data: HashMap<String, Value> },

    /// A key changed locally
    Update { key: String, value: Value },

    /// A key was removed locally
    Deleted { key: String },

    /// Reply to a get; `value` is `None` when absent (or timed out)
    Value {
        key: String,
        value: Option<Value>,
    },

    /// A put or delete could not be served
    Rejected { reason: String },
}
