//! Shared types used across the system

pub mod client;
pub mod message;
pub mod node;

pub use client::{ClientEvent, ClientRequest};
pub use message::PeerMessage;
pub use node::{now_ms, Member, NodeId};
