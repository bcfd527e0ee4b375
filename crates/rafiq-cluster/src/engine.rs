//! Replication engine: put / get / delete
//!
//! Replication factor is fixed at 2 (primary + secondary). Any node can
//! receive any request; the engine routes it to the owners computed
//! from this node's live view. Writes are applied only on the primary
//! (or in single-copy mode) and pushed to the secondary fire-and-forget;
//! there are no acks and no retries; a missed replica is healed later
//! by snapshot reconciliation.

use serde_json::Value;
use tracing::{debug, info, warn};

use rafiq_core::types::{ClientEvent, NodeId, PeerMessage};

use crate::coordinator::Coordinator;
use crate::error::{ClusterError, ClusterResult};
use crate::event::{ClientHandle, NodeEvent, ReplySink};
use crate::partition::assign;

/// Someone waiting on a get: a local client or the peer that forwarded
/// the request to us.
#[derive(Debug)]
pub(crate) enum GetWaiter {
    Client(ClientHandle),
    Peer(ReplySink),
}

impl GetWaiter {
    fn send_value(&self, key: &str, value: Option<Value>) {
        match self {
            GetWaiter::Client(client) => client.send(ClientEvent::Value {
                key: key.to_string(),
                value,
            }),
            GetWaiter::Peer(reply) => reply.send(PeerMessage::Value {
                key: key.to_string(),
                value,
            }),
        }
    }
}

/// An unresolved forwarded get. The first of (primary reply, secondary
/// reply, timeout) wins; `seq` makes stale timer events inert after
/// resolution and re-issue.
pub(crate) struct PendingGet {
    pub seq: u64,
    pub secondary: NodeId,
    pub waiters: Vec<GetWaiter>,
}

impl Coordinator {
    /// Serve a put received from a client or forwarded by a peer.
    ///
    /// Rejections (capacity, no live nodes) surface to the caller; a
    /// failed forward or replicate is only logged, per the best-effort
    /// replication contract.
    pub(crate) fn handle_put(&mut self, key: String, value: Value) -> ClusterResult<()> {
        // Capacity is checked before routing, independent of ownership
        if self.store.is_full() {
            warn!("[{}] Store is full, rejecting put {}", self.node_id, key);
            return Err(ClusterError::StoreFull {
                max: self.store.max_entries(),
            });
        }

        let live = self.live_view();
        let (primary, secondary) = match assign(&key, &live) {
            Some((p, s)) => (p.clone(), s.clone()),
            None => return Err(ClusterError::NoLiveNodes),
        };

        debug!(
            "[{}] PUT {}: primary={}, secondary={}",
            self.node_id, key, primary, secondary
        );

        if primary == self.node_id && secondary == self.node_id {
            // Single-copy mode: no replication traffic
            self.write_local(key, value);
            return Ok(());
        }

        if secondary == self.node_id && primary != self.node_id {
            // The store is never written on a non-primary node
            self.forward_put(&primary, key, value);
            return Ok(());
        }

        if primary == self.node_id {
            self.write_local(key.clone(), value.clone());
            self.links.send(
                &secondary,
                PeerMessage::Replicate {
                    key,
                    value,
                    from_peer: self.node_id.clone(),
                },
            );
        } else {
            // Neither owner: defensive fallback, route to the primary
            self.forward_put(&primary, key, value);
        }

        Ok(())
    }

    fn write_local(&mut self, key: String, value: Value) {
        self.store.insert(key.clone(), value.clone());
        self.store.persist();
        self.notify(ClientEvent::Update { key, value });
    }

    fn forward_put(&mut self, primary: &str, key: String, value: Value) {
        debug!("[{}] Forwarding put {} to primary {}", self.node_id, key, primary);
        self.links.send(primary, PeerMessage::Put { key, value });
    }

    /// Apply a replicated write pushed by a primary. Ownership is
    /// re-validated against our own view at receipt time, not trusted
    /// from the sender.
    pub(crate) fn handle_replicate(&mut self, key: String, value: Value, from_peer: &str) {
        let live = self.live_view();
        let owned = matches!(
            assign(&key, &live),
            Some((p, s)) if *p == self.node_id || *s == self.node_id
        );

        if !owned {
            debug!(
                "[{}] Ignoring replicate of {} from {}: not an owner",
                self.node_id, key, from_peer
            );
            return;
        }

        debug!("[{}] Replicating key {} from {}", self.node_id, key, from_peer);
        self.write_local(key, value);
    }

    /// Apply a replicated delete pushed by a primary, with the same
    /// ownership re-validation as [`handle_replicate`].
    ///
    /// [`handle_replicate`]: Coordinator::handle_replicate
    pub(crate) fn handle_replicate_delete(&mut self, key: &str, from_peer: &str) {
        let live = self.live_view();
        let owned = matches!(
            assign(key, &live),
            Some((p, s)) if *p == self.node_id || *s == self.node_id
        );

        if !owned {
            debug!(
                "[{}] Ignoring replicated delete of {} from {}: not an owner",
                self.node_id, key, from_peer
            );
            return;
        }

        if self.store.remove(key).is_some() {
            debug!("[{}] Replicated delete of {}", self.node_id, key);
            self.store.persist();
            self.notify(ClientEvent::Deleted {
                key: key.to_string(),
            });
        }
    }

    /// Serve a get. A local copy answers immediately regardless of
    /// ownership; otherwise the request races the primary against the
    /// staggered secondary, and the overall timeout answers absent.
    pub(crate) fn handle_get(&mut self, key: String, waiter: GetWaiter) {
        let live = self.live_view();
        let (primary, secondary) = match assign(&key, &live) {
            Some((p, s)) => (p.clone(), s.clone()),
            None => {
                debug!("[{}] GET {}: no live nodes", self.node_id, key);
                waiter.send_value(&key, None);
                return;
            }
        };

        if let Some(value) = self.store.get(&key) {
            debug!("[{}] GET {}: local hit", self.node_id, key);
            waiter.send_value(&key, Some(value.clone()));
            return;
        }

        // Piggyback on an in-flight race for the same key
        if let Some(pending) = self.pending_gets.get_mut(&key) {
            pending.waiters.push(waiter);
            return;
        }

        if primary == self.node_id && secondary == self.node_id {
            // Sole owner with no local copy: nobody else to ask
            waiter.send_value(&key, None);
            return;
        }

        debug!(
            "[{}] GET {}: forwarding, primary={}, secondary={}",
            self.node_id, key, primary, secondary
        );

        if primary != self.node_id {
            self.links
                .send(&primary, PeerMessage::Get { key: key.clone() });
        }

        self.get_seq += 1;
        let seq = self.get_seq;
        self.pending_gets.insert(
            key.clone(),
            PendingGet {
                seq,
                secondary,
                waiters: vec![waiter],
            },
        );

        self.schedule(
            self.tuning.get_stagger(),
            NodeEvent::GetStagger {
                key: key.clone(),
                seq,
            },
        );
        self.schedule(self.tuning.get_timeout(), NodeEvent::GetTimeout { key, seq });
    }

    /// Stagger elapsed with no answer yet: try the secondary.
    pub(crate) fn handle_get_stagger(&mut self, key: &str, seq: u64) {
        let secondary = match self.pending_gets.get(key) {
            Some(pending) if pending.seq == seq => pending.secondary.clone(),
            _ => return, // already resolved
        };

        if secondary != self.node_id {
            self.links.send(
                &secondary,
                PeerMessage::Get {
                    key: key.to_string(),
                },
            );
        }
    }

    /// Overall deadline elapsed: answer absent. This is a timeout-based
    /// negative, not a proof of absence.
    pub(crate) fn handle_get_timeout(&mut self, key: &str, seq: u64) {
        let resolved = match self.pending_gets.get(key) {
            Some(pending) => pending.seq == seq,
            None => false,
        };
        if !resolved {
            return;
        }

        info!("[{}] GET failed for key: {}", self.node_id, key);
        if let Some(pending) = self.pending_gets.remove(key) {
            for waiter in pending.waiters {
                waiter.send_value(key, None);
            }
        }
    }

    /// A value reply arrived from a peer. The first reply for a key
    /// resolves its race; anything later is inert and dropped.
    pub(crate) fn handle_value(&mut self, key: &str, value: Option<Value>) {
        match self.pending_gets.remove(key) {
            Some(pending) => {
                for waiter in pending.waiters {
                    waiter.send_value(key, value.clone());
                }
            }
            None => debug!("[{}] Late value reply for {}, dropping", self.node_id, key),
        }
    }

    /// Serve a delete. The receiving node applies it locally and, when
    /// it is the original request (`is_broadcast == false`), relays it
    /// to every connected peer with the broadcast flag set so relays
    /// are never re-relayed.
    pub(crate) fn handle_delete(&mut self, key: &str, is_broadcast: bool) {
        if self.store.contains(key) {
            debug!("[{}] Deleting key {}", self.node_id, key);
            self.store.remove(key);
            self.store.persist();
            self.notify(ClientEvent::Deleted {
                key: key.to_string(),
            });
        } else {
            debug!("[{}] Delete of absent key {}", self.node_id, key);
        }

        if !is_broadcast {
            // Ownership may differ per node's view, so every connected
            // peer hears about the delete, not just the owners
            for peer in self.links.connected() {
                self.links.send(
                    &peer,
                    PeerMessage::Delete {
                        key: key.to_string(),
                        is_broadcast: true,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rafiq_core::types::Member;
    use rafiq_core::RafiqConfig;
    use rafiq_store::{LocalStore, NullBackend};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

    use crate::event::NodeEvent;

    fn config(node_id: &str, members: &[&str], max_store: usize) -> RafiqConfig {
        let mut config = RafiqConfig::from_env();
        config.node_id = node_id.to_string();
        config.cluster.members = members
            .iter()
            .enumerate()
            .map(|(i, id)| Member::new(*id, "localhost", 8080 + i as u16))
            .collect();
        config.cluster.max_store_size = max_store;
        config
    }

    fn coordinator(
        node_id: &str,
        members: &[&str],
        max_store: usize,
    ) -> (Coordinator, UnboundedReceiver<NodeEvent>) {
        let config = config(node_id, members, max_store);
        let store = LocalStore::new(max_store, Box::new(NullBackend));
        let (tx, rx) = mpsc::unbounded_channel();
        (Coordinator::new(&config, store, tx), rx)
    }

    fn attach(c: &mut Coordinator, peer: &str) -> UnboundedReceiver<rafiq_core::types::PeerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        c.dispatch(NodeEvent::PeerConnected {
            peer: peer.to_string(),
            link: tx,
        });
        rx
    }

    fn client() -> (ClientHandle, UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientHandle::new(1, tx), rx)
    }

    // Key facts used below, with members [node1, node2, node3]:
    // "x" hashes to index 0 -> (node1, node2)
    // "y" hashes to index 1 -> (node2, node3)
    // "z" hashes to index 2 -> (node3, node1)

    #[tokio::test]
    async fn test_put_on_primary_stores_and_replicates() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node2 = attach(&mut c, "node2");
        let _node3 = attach(&mut c, "node3");

        c.handle_put("x".to_string(), json!("1")).unwrap();

        assert_eq!(c.store().get("x"), Some(&json!("1")));
        match node2.try_recv().unwrap() {
            PeerMessage::Replicate { key, value, from_peer } => {
                assert_eq!(key, "x");
                assert_eq!(value, json!("1"));
                assert_eq!(from_peer, "node1");
            }
            other => panic!("expected replicate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_on_non_owner_forwards_to_primary() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node2 = attach(&mut c, "node2");

        // "y" is owned by (node2, node3); node1 is neither
        c.handle_put("y".to_string(), json!(2)).unwrap();

        assert!(c.store().get("y").is_none());
        assert!(matches!(
            node2.try_recv().unwrap(),
            PeerMessage::Put { key, .. } if key == "y"
        ));
    }

    #[tokio::test]
    async fn test_put_on_secondary_forwards_not_writes() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node3 = attach(&mut c, "node3");

        // "z" is owned by (node3, node1); node1 is the secondary
        c.handle_put("z".to_string(), json!(3)).unwrap();

        assert!(c.store().get("z").is_none());
        assert!(matches!(
            node3.try_recv().unwrap(),
            PeerMessage::Put { key, .. } if key == "z"
        ));
    }

    #[tokio::test]
    async fn test_single_copy_mode_emits_no_traffic() {
        let (mut c, _rx) = coordinator("node1", &["node1"], 100);
        c.handle_put("x".to_string(), json!("solo")).unwrap();
        assert_eq!(c.store().get("x"), Some(&json!("solo")));
    }

    #[tokio::test]
    async fn test_put_rejected_at_capacity() {
        let (mut c, _rx) = coordinator("node1", &["node1"], 2);
        c.handle_put("a".to_string(), json!(1)).unwrap();
        c.handle_put("b".to_string(), json!(2)).unwrap();

        let err = c.handle_put("c".to_string(), json!(3)).unwrap_err();
        assert!(matches!(err, ClusterError::StoreFull { max: 2 }));

        // The first two entries are untouched
        assert_eq!(c.store().len(), 2);
        assert_eq!(c.store().get("a"), Some(&json!(1)));
        assert_eq!(c.store().get("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_replicate_applies_only_on_owners() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);

        // node1 owns "x" but not "y"
        c.handle_replicate("x".to_string(), json!("1"), "node2");
        c.handle_replicate("y".to_string(), json!("2"), "node2");

        assert_eq!(c.store().get("x"), Some(&json!("1")));
        assert!(c.store().get("y").is_none());
    }

    #[tokio::test]
    async fn test_replicate_delete_applies_only_on_owners() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        c.store.insert("x".to_string(), json!("1"));
        c.store.insert("y".to_string(), json!("2"));

        c.handle_replicate_delete("x", "node2");
        c.handle_replicate_delete("y", "node2");

        assert!(c.store().get("x").is_none());
        // "y" is not owned by node1, so the delete is a no-op
        assert_eq!(c.store().get("y"), Some(&json!("2")));
    }

    #[tokio::test]
    async fn test_get_local_hit_ignores_ownership() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        // "y" is not owned by node1, but a cached copy still answers
        c.store.insert("y".to_string(), json!("cached"));

        let (handle, mut replies) = client();
        c.handle_get("y".to_string(), GetWaiter::Client(handle));

        assert_eq!(
            replies.try_recv().unwrap(),
            ClientEvent::Value {
                key: "y".to_string(),
                value: Some(json!("cached"))
            }
        );
    }

    #[tokio::test]
    async fn test_get_race_first_reply_wins() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node2 = attach(&mut c, "node2");

        let (handle, mut replies) = client();
        c.handle_get("y".to_string(), GetWaiter::Client(handle));

        // Forwarded to the primary
        assert!(matches!(
            node2.try_recv().unwrap(),
            PeerMessage::Get { key } if key == "y"
        ));

        // Primary answers
        c.handle_value("y", Some(json!("fresh")));
        assert_eq!(
            replies.try_recv().unwrap(),
            ClientEvent::Value {
                key: "y".to_string(),
                value: Some(json!("fresh"))
            }
        );

        // A later secondary reply is dropped, not delivered again
        c.handle_value("y", Some(json!("stale")));
        assert!(replies.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_timeout_answers_absent() {
        let (mut c, mut events) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let _node2 = attach(&mut c, "node2");

        let (handle, mut replies) = client();
        c.handle_get("y".to_string(), GetWaiter::Client(handle));

        // Let the stagger and timeout timers fire
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        while let Ok(event) = events.try_recv() {
            c.dispatch(event);
        }

        assert_eq!(
            replies.try_recv().unwrap(),
            ClientEvent::Value {
                key: "y".to_string(),
                value: None
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_stagger_tries_secondary() {
        let (mut c, mut events) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node2 = attach(&mut c, "node2");
        let mut node3 = attach(&mut c, "node3");

        let (handle, _replies) = client();
        c.handle_get("y".to_string(), GetWaiter::Client(handle));
        assert!(node2.try_recv().is_ok());
        assert!(node3.try_recv().is_err());

        // Past the stagger but before the timeout
        tokio::time::sleep(Duration::from_millis(600)).await;
        while let Ok(event) = events.try_recv() {
            c.dispatch(event);
        }

        assert!(matches!(
            node3.try_recv().unwrap(),
            PeerMessage::Get { key } if key == "y"
        ));
    }

    #[tokio::test]
    async fn test_delete_broadcasts_once() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node2 = attach(&mut c, "node2");
        let mut node3 = attach(&mut c, "node3");
        c.store.insert("x".to_string(), json!("1"));

        c.handle_delete("x", false);

        assert!(c.store().get("x").is_none());
        for rx in [&mut node2, &mut node3] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                PeerMessage::Delete { key, is_broadcast: true } if key == "x"
            ));
        }
    }

    #[tokio::test]
    async fn test_broadcast_delete_never_loops() {
        let (mut c, _rx) = coordinator("node1", &["node1", "node2", "node3"], 100);
        let mut node2 = attach(&mut c, "node2");
        let mut node3 = attach(&mut c, "node3");
        c.store.insert("x".to_string(), json!("1"));

        // A relayed delete applies locally but is never re-relayed
        c.handle_delete("x", true);

        assert!(c.store().get("x").is_none());
        assert!(node2.try_recv().is_err());
        assert!(node3.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forwarded_get_replies_over_connection() {
        let (mut c, _rx) = coordinator("node2", &["node1", "node2", "node3"], 100);
        c.store.insert("y".to_string(), json!("v"));

        let (reply_tx, mut reply_rx): (UnboundedSender<PeerMessage>, _) =
            mpsc::unbounded_channel();
        c.dispatch(NodeEvent::PeerInbound {
            msg: PeerMessage::Get {
                key: "y".to_string(),
            },
            reply: ReplySink::new(reply_tx),
        });

        assert!(matches!(
            reply_rx.try_recv().unwrap(),
            PeerMessage::Value { key, value: Some(v) } if key == "y" && v == json!("v")
        ));
    }
}
