//! Rafiq Core Library
//!
//! Shared types, configuration and errors for the Rafiq peer-replicated
//! key-value store.

pub mod config;
pub mod error;
pub mod types;

pub use config::RafiqConfig;
pub use error::{Error, Result};

/// Rafiq version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default heartbeat send interval in milliseconds
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Default heartbeat timeout in milliseconds
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Default liveness check interval in milliseconds
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;

/// Default delay before dialing peers at startup, in milliseconds
pub const DEFAULT_PEER_CONNECT_DELAY_MS: u64 = 5_000;

/// Default delay before requesting snapshots at startup, in milliseconds
pub const DEFAULT_SNAPSHOT_REQUEST_DELAY_MS: u64 = 10_000;

/// Default stagger before falling back to the secondary on a forwarded get
pub const DEFAULT_GET_STAGGER_MS: u64 = 500;

/// Default overall timeout for a forwarded get, in milliseconds
pub const DEFAULT_GET_TIMEOUT_MS: u64 = 1_000;

/// Default maximum number of entries in the local store
pub const DEFAULT_MAX_STORE_SIZE: usize = 1_000;
