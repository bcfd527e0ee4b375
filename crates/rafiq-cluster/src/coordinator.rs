//! The per-node coordinator
//!
//! Owns every piece of mutable node state (store, membership, links,
//! pending snapshot and get bookkeeping) and consumes the single
//! event channel. One coordinator task per node; handlers run to
//! completion, so none of the state needs locking.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rafiq_core::types::{now_ms, ClientEvent, ClientRequest, NodeId, PeerMessage};
use rafiq_core::RafiqConfig;
use rafiq_store::LocalStore;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::engine::PendingGet;
use crate::event::{ClientHandle, NodeEvent, ReplySink};
use crate::link::PeerLinks;
use crate::membership::{MembershipEvent, MembershipMonitor};

/// Capacity of the client notification fan-out channel
const NOTIFY_CAPACITY: usize = 256;

pub struct Coordinator {
    pub(crate) node_id: NodeId,
    /// Configured member ids in canonical order
    pub(crate) member_ids: Vec<NodeId>,
    pub(crate) tuning: rafiq_core::config::ClusterConfig,
    pub(crate) store: LocalStore,
    pub(crate) membership: MembershipMonitor,
    pub(crate) links: PeerLinks,
    /// Peers owed a snapshot the moment they connect
    pub(crate) pending_snapshot_sends: HashSet<NodeId>,
    /// Peers we still want a snapshot from, retried on their connect
    pub(crate) pending_snapshot_requests: HashSet<NodeId>,
    /// In-flight forwarded gets, keyed by the key being fetched
    pub(crate) pending_gets: HashMap<String, PendingGet>,
    pub(crate) get_seq: u64,
    /// Posts timer events back into our own channel
    pub(crate) events_tx: UnboundedSender<NodeEvent>,
    notifications: broadcast::Sender<ClientEvent>,
}

impl Coordinator {
    pub fn new(
        config: &RafiqConfig,
        store: LocalStore,
        events_tx: UnboundedSender<NodeEvent>,
    ) -> Self {
        let peers: Vec<NodeId> = config.peers().into_iter().map(|m| m.id).collect();
        let (notifications, _) = broadcast::channel(NOTIFY_CAPACITY);

        Self {
            node_id: config.node_id.clone(),
            member_ids: config.member_ids(),
            tuning: config.cluster.clone(),
            store,
            membership: MembershipMonitor::new(peers, config.cluster.heartbeat_timeout_ms),
            links: PeerLinks::new(),
            pending_snapshot_sends: HashSet::new(),
            pending_snapshot_requests: HashSet::new(),
            pending_gets: HashMap::new(),
            get_seq: 0,
            events_tx,
            notifications,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Whether this node currently considers `peer` failed.
    pub fn is_peer_failed(&self, peer: &str) -> bool {
        self.membership.is_failed(peer)
    }

    /// Subscribe to store-change notifications (client fan-out).
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.notifications.subscribe()
    }

    /// Handle for creating subscriptions after the coordinator task has
    /// taken ownership of `self`.
    pub fn notifier(&self) -> broadcast::Sender<ClientEvent> {
        self.notifications.clone()
    }

    /// Consume events until the channel closes.
    pub async fn run(mut self, mut events: tokio::sync::mpsc::UnboundedReceiver<NodeEvent>) {
        info!("[{}] Coordinator running", self.node_id);
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        info!("[{}] Coordinator stopped", self.node_id);
    }

    /// Handle one event to completion.
    pub fn dispatch(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::PeerConnected { peer, link } => self.handle_peer_connected(peer, link),
            NodeEvent::PeerDisconnected { peer } => {
                info!("[{}] Peer disconnected: {}", self.node_id, peer);
                self.links.detach(&peer);
            }
            NodeEvent::PeerInbound { msg, reply } => self.handle_peer_message(msg, reply),
            NodeEvent::ClientConnected { client } => {
                debug!("[{}] Client {} connected", self.node_id, client.id);
                client.send(ClientEvent::Store {
                    data: self.store.dump(),
                });
            }
            NodeEvent::ClientRequest { client, request } => {
                self.handle_client_request(client, request)
            }
            NodeEvent::SendHeartbeats => self.send_heartbeats(),
            NodeEvent::CheckLiveness => self.check_liveness(),
            NodeEvent::RequestSnapshots => self.request_snapshots(),
            NodeEvent::GetStagger { key, seq } => self.handle_get_stagger(&key, seq),
            NodeEvent::GetTimeout { key, seq } => self.handle_get_timeout(&key, seq),
        }
    }

    fn handle_peer_connected(&mut self, peer: NodeId, link: UnboundedSender<PeerMessage>) {
        info!("[{}] Peer connected: {}", self.node_id, peer);
        self.links.attach(peer.clone(), link);

        // Drain the snapshot pending set for this peer, both directions
        if self.pending_snapshot_sends.remove(&peer) {
            self.send_snapshot_to(&peer);
        }
        if self.pending_snapshot_requests.contains(&peer) {
            self.request_snapshot_from(&peer);
        }
    }

    fn handle_peer_message(&mut self, msg: PeerMessage, reply: ReplySink) {
        match msg {
            PeerMessage::Heartbeat { from, timestamp } => {
                self.membership.record_heartbeat(&from, timestamp);
            }
            PeerMessage::Put { key, value } => {
                // A forward from a non-owner. Failure is logged, never
                // bounced back to the forwarder.
                if let Err(e) = self.handle_put(key, value) {
                    warn!("[{}] Forwarded put rejected: {}", self.node_id, e);
                }
            }
            PeerMessage::Replicate {
                key,
                value,
                from_peer,
            } => self.handle_replicate(key, value, &from_peer),
            PeerMessage::ReplicateDelete { key, from_peer } => {
                self.handle_replicate_delete(&key, &from_peer)
            }
            PeerMessage::Get { key } => self.handle_get(key, crate::engine::GetWaiter::Peer(reply)),
            PeerMessage::Value { key, value } => self.handle_value(&key, value),
            PeerMessage::Delete { key, is_broadcast } => self.handle_delete(&key, is_broadcast),
            PeerMessage::RequestSnapshot { requester, .. } => {
                self.handle_request_snapshot(&requester)
            }
            PeerMessage::Snapshot { to, from, data, .. } => self.handle_snapshot(&to, &from, data),
        }
    }

    fn handle_client_request(&mut self, client: ClientHandle, request: ClientRequest) {
        match request {
            ClientRequest::Put { key, value } => {
                if let Err(e) = self.handle_put(key, value) {
                    client.send(ClientEvent::Rejected {
                        reason: e.to_string(),
                    });
                }
            }
            ClientRequest::Get { key } => {
                self.handle_get(key, crate::engine::GetWaiter::Client(client))
            }
            ClientRequest::Delete { key } => self.handle_delete(&key, false),
        }
    }

    /// Emit heartbeats to every connected peer.
    fn send_heartbeats(&mut self) {
        let timestamp = now_ms();
        for peer in self.links.connected() {
            self.links.send(
                &peer,
                PeerMessage::Heartbeat {
                    from: self.node_id.clone(),
                    timestamp,
                },
            );
        }
    }

    /// Run the liveness check and log transitions. Failure and recovery
    /// have no other side effect here: they change the live view the
    /// partitioner sees, and reconciliation happens lazily through
    /// per-key routing and snapshots.
    fn check_liveness(&mut self) {
        for event in self.membership.check(now_ms()) {
            match event {
                MembershipEvent::Failed(peer) => {
                    warn!("[{}] Node failed: {}", self.node_id, peer);
                }
                MembershipEvent::Recovered(peer) => {
                    info!("[{}] Node recovered: {}", self.node_id, peer);
                }
            }
        }
    }

    /// Configured member order filtered by the current liveness view.
    pub(crate) fn live_view(&self) -> Vec<NodeId> {
        self.membership.live_view(&self.member_ids)
    }

    /// Broadcast a store-change notification to local subscribers.
    pub(crate) fn notify(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.notifications.send(event);
    }

    /// Post `event` back into our own channel after `delay`.
    pub(crate) fn schedule(&self, delay: Duration, event: NodeEvent) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }
}
