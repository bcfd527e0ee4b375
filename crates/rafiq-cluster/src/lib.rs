//! Rafiq Cluster - the node coordination engine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Coordinator (one task)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────────────┐  │
//! │  │ Partitioner│  │ Membership │  │  Replication Engine    │  │
//! │  │            │  │  Monitor   │  │                        │  │
//! │  │ key → pair │  │ heartbeats │  │  put / get / delete    │  │
//! │  └────────────┘  └────────────┘  └────────────────────────┘  │
//! │                                                              │
//! │  ┌────────────────────┐  ┌────────────────────────────────┐  │
//! │  │ Snapshot           │  │  Peer Link Manager             │  │
//! │  │ Coordinator        │  │  one outbound link per peer    │  │
//! │  └────────────────────┘  └────────────────────────────────┘  │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every node runs one coordinator task that owns all mutable node
//! state and consumes a single event channel. Peer links, client
//! connections and timers all post into that channel, so handlers run
//! to completion with no locking; concurrency exists only across
//! nodes. Peer liveness views are strictly local and may disagree
//! transiently between nodes, which is the documented consistency
//! model: last writer wins, no conflict detection.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event;
pub mod link;
pub mod membership;
pub mod partition;
pub mod snapshot;

pub use coordinator::Coordinator;
pub use error::{ClusterError, ClusterResult};
pub use event::{ClientHandle, NodeEvent, ReplySink};
pub use link::PeerLinks;
pub use membership::{MembershipEvent, MembershipMonitor};
pub use partition::{assign, key_hash};
