//! Node server for Rafiq
//!
//! Hosts the WebSocket endpoints peers and clients dial, runs the
//! outbound peer dialer, and wires everything into the coordinator's
//! event channel. The coordination engine itself never sees a socket:
//! this crate turns connections into events and link channels.

pub mod dialer;
pub mod server;
pub mod ws;

pub use server::NodeServer;
