//! Error types for Rafiq

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown node identity: {0}")]
    UnknownNode(String),

    // Wire errors
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Environment errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}
