//! Snapshot exchange and reconciliation
//!
//! After startup (and on every peer connect) nodes trade full-store
//! snapshots to resynchronize. Applying a snapshot is a pure
//! reconciliation over (local store, incoming data, live view): prune
//! what we no longer own, adopt what we now own, leave the rest.
//! Applying the same snapshot twice is a no-op the second time.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use rafiq_core::types::{now_ms, ClientEvent, PeerMessage};

use crate::coordinator::Coordinator;
use crate::partition::assign;

impl Coordinator {
    /// Startup snapshot pass: ask every configured peer for its store.
    /// Peers not connected yet go on the pending-request set and are
    /// asked the moment they connect.
    pub(crate) fn request_snapshots(&mut self) {
        info!("[{}] Requesting snapshots from peers", self.node_id);
        let peers: Vec<String> = self
            .member_ids
            .iter()
            .filter(|m| **m != self.node_id)
            .cloned()
            .collect();
        for peer in peers {
            self.request_snapshot_from(&peer);
        }
    }

    pub(crate) fn request_snapshot_from(&mut self, peer: &str) {
        if self.links.is_connected(peer) {
            debug!("[{}] Requesting snapshot from {}", self.node_id, peer);
            self.links.send(
                peer,
                PeerMessage::RequestSnapshot {
                    requester: self.node_id.clone(),
                    timestamp: now_ms(),
                },
            );
            self.pending_snapshot_requests.remove(peer);
        } else {
            debug!(
                "[{}] Peer {} not connected, queueing snapshot request",
                self.node_id, peer
            );
            self.pending_snapshot_requests.insert(peer.to_string());
        }
    }

    /// A peer asked for our store. Serve it now if the peer is
    /// connected, otherwise owe it a snapshot for its next connect.
    pub(crate) fn handle_request_snapshot(&mut self, requester: &str) {
        debug!("[{}] Snapshot request from {}", self.node_id, requester);
        if self.links.is_connected(requester) {
            self.send_snapshot_to(requester);
        } else {
            self.pending_snapshot_sends.insert(requester.to_string());
        }
    }

    pub(crate) fn send_snapshot_to(&mut self, peer: &str) {
        debug!(
            "[{}] Sending snapshot ({} keys) to {}",
            self.node_id,
            self.store.len(),
            peer
        );
        let snapshot = PeerMessage::Snapshot {
            to: peer.to_string(),
            from: self.node_id.clone(),
            data: self.store.dump(),
            timestamp: now_ms(),
        };
        self.links.send(peer, snapshot);
    }

    /// Apply an incoming snapshot. Snapshots not addressed to this node
    /// are silently ignored; partial or misrouted messages are never
    /// an error.
    pub(crate) fn handle_snapshot(&mut self, to: &str, from: &str, data: HashMap<String, Value>) {
        if to != self.node_id {
            debug!(
                "[{}] Ignoring snapshot addressed to {} (from {})",
                self.node_id, to, from
            );
            return;
        }

        info!(
            "[{}] Received snapshot from {} ({} keys)",
            self.node_id,
            from,
            data.len()
        );

        let live = self.live_view();
        let mut removed = 0usize;
        let mut updated = 0usize;

        // Prune keys this node no longer owns under the current view
        for key in self.store.keys() {
            let owned = matches!(
                assign(&key, &live),
                Some((p, s)) if *p == self.node_id || *s == self.node_id
            );
            if !owned {
                self.store.remove(&key);
                removed += 1;
            }
        }

        // Adopt snapshot values for keys this node owns; keys owned by
        // neither side are dropped, owned local keys absent from the
        // snapshot stay as they are
        for (key, value) in data {
            let owned = matches!(
                assign(&key, &live),
                Some((p, s)) if *p == self.node_id || *s == self.node_id
            );
            if owned {
                self.store.insert(key, value);
                updated += 1;
            }
        }

        self.store.persist();
        self.notify(ClientEvent::Store {
            data: self.store.dump(),
        });

        info!(
            "[{}] Snapshot processed: {} updated, {} removed",
            self.node_id, updated, removed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rafiq_core::types::Member;
    use rafiq_core::RafiqConfig;
    use rafiq_store::{LocalStore, NullBackend};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::event::NodeEvent;

    fn coordinator(node_id: &str) -> (Coordinator, UnboundedReceiver<NodeEvent>) {
        let mut config = RafiqConfig::from_env();
        config.node_id = node_id.to_string();
        config.cluster.members = vec![
            Member::new("node1", "localhost", 8080),
            Member::new("node2", "localhost", 8081),
            Member::new("node3", "localhost", 8082),
        ];
        let store = LocalStore::new(100, Box::new(NullBackend));
        let (tx, rx) = mpsc::unbounded_channel();
        (Coordinator::new(&config, store, tx), rx)
    }

    fn attach(c: &mut Coordinator, peer: &str) -> UnboundedReceiver<PeerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        c.dispatch(NodeEvent::PeerConnected {
            peer: peer.to_string(),
            link: tx,
        });
        rx
    }

    // With all of node1..node3 live: "x" -> (node1, node2),
    // "y" -> (node2, node3), "z" -> (node3, node1)

    #[test]
    fn test_apply_prunes_and_adopts_by_ownership() {
        let (mut c, _rx) = coordinator("node1");
        // node1 owns "x" and "z" but not "y"
        c.store.insert("y".to_string(), json!("stale"));

        let mut data = HashMap::new();
        data.insert("x".to_string(), json!("snap-x"));
        data.insert("y".to_string(), json!("snap-y"));
        data.insert("z".to_string(), json!("snap-z"));

        c.handle_snapshot("node1", "node2", data);

        assert_eq!(c.store().get("x"), Some(&json!("snap-x")));
        assert_eq!(c.store().get("z"), Some(&json!("snap-z")));
        assert!(c.store().get("y").is_none());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let (mut c, _rx) = coordinator("node1");
        c.store.insert("x".to_string(), json!("local"));
        c.store.insert("y".to_string(), json!("not-ours"));

        let mut data = HashMap::new();
        data.insert("x".to_string(), json!("snap"));
        data.insert("y".to_string(), json!("still-not-ours"));

        c.handle_snapshot("node1", "node2", data.clone());
        let once = c.store().dump();

        c.handle_snapshot("node1", "node2", data);
        assert_eq!(c.store().dump(), once);
    }

    #[test]
    fn test_owned_keys_absent_from_snapshot_survive() {
        let (mut c, _rx) = coordinator("node1");
        c.store.insert("x".to_string(), json!("mine"));

        c.handle_snapshot("node1", "node2", HashMap::new());

        assert_eq!(c.store().get("x"), Some(&json!("mine")));
    }

    #[test]
    fn test_snapshot_for_someone_else_ignored() {
        let (mut c, _rx) = coordinator("node1");
        c.store.insert("y".to_string(), json!("untouched"));

        let mut data = HashMap::new();
        data.insert("x".to_string(), json!("snap"));
        c.handle_snapshot("node3", "node2", data);

        // Neither pruned nor adopted
        assert_eq!(c.store().get("y"), Some(&json!("untouched")));
        assert!(c.store().get("x").is_none());
    }

    #[test]
    fn test_request_queued_until_connect() {
        let (mut c, _rx) = coordinator("node1");
        c.request_snapshots();
        // Nobody connected yet: both peers pending

        let mut node2 = attach(&mut c, "node2");
        // The connect drains the pending request
        assert!(matches!(
            node2.try_recv().unwrap(),
            PeerMessage::RequestSnapshot { requester, .. } if requester == "node1"
        ));
    }

    #[test]
    fn test_serve_queued_until_requester_connects() {
        let (mut c, _rx) = coordinator("node1");
        c.store.insert("x".to_string(), json!("1"));

        // Request arrives while node2 has no link
        c.handle_request_snapshot("node2");

        let mut node2 = attach(&mut c, "node2");
        match node2.try_recv().unwrap() {
            PeerMessage::Snapshot { to, from, data, .. } => {
                assert_eq!(to, "node2");
                assert_eq!(from, "node1");
                assert_eq!(data.get("x"), Some(&json!("1")));
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_connected_request_served_immediately() {
        let (mut c, _rx) = coordinator("node1");
        c.store.insert("x".to_string(), json!("1"));
        let mut node2 = attach(&mut c, "node2");

        c.handle_request_snapshot("node2");

        assert!(matches!(
            node2.try_recv().unwrap(),
            PeerMessage::Snapshot { to, .. } if to == "node2"
        ));
        assert!(!c.pending_snapshot_sends.contains("node2"));
    }
}
