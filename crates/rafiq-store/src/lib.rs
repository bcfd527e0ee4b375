//! Rafiq local store
//!
//! The in-memory key-value map each node owns, backed by a durable
//! blob that is loaded at startup and rewritten after every mutation.
//! Durability is best-effort: a failed save is logged and the in-memory
//! mutation still counts as having succeeded.

pub mod error;
pub mod persist;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use persist::{FileBackend, NullBackend, StoreBackend};
pub use store::LocalStore;
