//! Store error types

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store is full ({max} entries)")]
    Full { max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store blob: {0}")]
    Corrupt(#[from] serde_json::Error),
}
