//! Heartbeat-based peer liveness tracking
//!
//! Each peer walks `unknown → alive → failed → alive → …` as seen from
//! this node. The monitor only records timestamps and answers a
//! periodic check; it never talks to the network. Its verdicts feed
//! the partitioner's live-node view and the logs, nothing else; any
//! richer rebalancing policy is deliberately out of scope.

use std::collections::{HashMap, HashSet};

use rafiq_core::types::NodeId;
use tracing::debug;

/// Liveness transition produced by a check pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// Peer's heartbeat gap exceeded the timeout
    Failed(NodeId),
    /// Previously-failed peer is heartbeating again
    Recovered(NodeId),
}

/// Tracks per-peer heartbeat recency and failure state.
pub struct MembershipMonitor {
    /// Peers under observation (everyone but this node)
    peers: Vec<NodeId>,
    /// Declared-failure threshold in milliseconds
    timeout_ms: i64,
    /// Latest heartbeat timestamp per peer; absent means never heard
    last_heartbeat: HashMap<NodeId, i64>,
    /// Peers currently considered failed
    failed: HashSet<NodeId>,
}

impl MembershipMonitor {
    pub fn new(peers: Vec<NodeId>, timeout_ms: u64) -> Self {
        Self {
            peers,
            timeout_ms: timeout_ms as i64,
            last_heartbeat: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// Record a heartbeat from `from`. Timestamps are kept monotonically
    /// non-decreasing; a reordered older heartbeat never rolls the clock
    /// back. Heartbeats from unconfigured nodes are ignored.
    pub fn record_heartbeat(&mut self, from: &str, timestamp: i64) {
        if !self.peers.iter().any(|p| p == from) {
            debug!("Ignoring heartbeat from unconfigured node {}", from);
            return;
        }
        let entry = self.last_heartbeat.entry(from.to_string()).or_insert(timestamp);
        if timestamp > *entry {
            *entry = timestamp;
        }
    }

    /// Run one liveness check at wall-clock `now` (epoch millis) and
    /// return the transitions it produced.
    ///
    /// A peer never heard from stays `unknown` rather than being
    /// declared failed before first contact; if such a peer is somehow
    /// in the failed set, its first sign of life is a recovery.
    pub fn check(&mut self, now: i64) -> Vec<MembershipEvent> {
        let mut events = Vec::new();

        for peer in &self.peers {
            match self.last_heartbeat.get(peer) {
                None => {
                    if self.failed.remove(peer) {
                        events.push(MembershipEvent::Recovered(peer.clone()));
                    }
                }
                Some(&ts) => {
                    if now - ts > self.timeout_ms {
                        if self.failed.insert(peer.clone()) {
                            events.push(MembershipEvent::Failed(peer.clone()));
                        }
                    } else if self.failed.remove(peer) {
                        events.push(MembershipEvent::Recovered(peer.clone()));
                    }
                }
            }
        }

        events
    }

    pub fn is_failed(&self, peer: &str) -> bool {
        self.failed.contains(peer)
    }

    /// Filter `ordered_members` down to the nodes currently believed
    /// alive, preserving order. This node itself is never in `peers`
    /// and therefore always survives the filter.
    pub fn live_view(&self, ordered_members: &[NodeId]) -> Vec<NodeId> {
        ordered_members
            .iter()
            .filter(|m| !self.failed.contains(*m))
            .cloned()
            .collect()
    }
}
