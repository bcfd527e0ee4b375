//! Cluster error types

use thiserror::Error;

/// Result type for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Cluster-related errors
///
/// Only the variants surfaced to callers live here; best-effort
/// failures (peer unreachable, persistence) are logged at the point
/// they occur and deliberately never become errors.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("No live nodes can serve this key")]
    NoLiveNodes,

    #[error("Local store is full ({max} entries)")]
    StoreFull { max: usize },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] rafiq_core::Error),

    #[error("Store error: {0}")]
    Store(#[from] rafiq_store::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
