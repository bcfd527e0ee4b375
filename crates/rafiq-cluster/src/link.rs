//! Peer link manager
//!
//! One outbound link per configured peer. A link is just the sending
//! half of an unbounded channel; the transport (or a test harness)
//! attaches it on connect and the coordinator is told about both
//! transitions through its event channel. Sending to a peer that is
//! not connected is a logged no-op; nothing is queued here. The only
//! queued retry in the whole system is the snapshot pending set, which
//! lives in the snapshot coordinator.

use std::collections::HashMap;

use rafiq_core::types::{NodeId, PeerMessage};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

#[derive(Default)]
pub struct PeerLinks {
    links: HashMap<NodeId, UnboundedSender<PeerMessage>>,
}

impl PeerLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a freshly-connected peer's outbound channel.
    pub fn attach(&mut self, peer: NodeId, tx: UnboundedSender<PeerMessage>) {
        debug!("Peer link attached: {}", peer);
        self.links.insert(peer, tx);
    }

    /// Drop the link to a disconnected peer.
    pub fn detach(&mut self, peer: &str) {
        if self.links.remove(peer).is_some() {
            debug!("Peer link detached: {}", peer);
        }
    }

    pub fn is_connected(&self, peer: &str) -> bool {
        self.links.contains_key(peer)
    }

    /// Best-effort send. Returns whether the message was handed to the
    /// transport; a disconnected peer gets a warning and the message is
    /// dropped.
    pub fn send(&mut self, peer: &str, msg: PeerMessage) -> bool {
        match self.links.get(peer) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    // Transport went away without a disconnect event yet
                    warn!("Link to {} is closed, dropping message", peer);
                    self.links.remove(peer);
                    false
                } else {
                    true
                }
            }
            None => {
                warn!("Peer {} not connected, dropping {}", peer, msg.kind());
                false
            }
        }
    }

    /// Ids of all currently-connected peers.
    pub fn connected(&self) -> Vec<NodeId> {
        self.links.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_send_to_unconnected_peer_is_dropped() {
        let mut links = PeerLinks::new();
        assert!(!links.send(
            "node2",
            PeerMessage::Get {
                key: "x".to_string()
            }
        ));
    }

    #[test]
    fn test_attached_link_delivers() {
        let mut links = PeerLinks::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        links.attach("node2".to_string(), tx);
        assert!(links.is_connected("node2"));

        assert!(links.send(
            "node2",
            PeerMessage::Get {
                key: "x".to_string()
            }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            PeerMessage::Get { key } if key == "x"
        ));
    }

    #[test]
    fn test_closed_link_detaches_itself() {
        let mut links = PeerLinks::new();
        let (tx, rx) = mpsc::unbounded_channel();
        links.attach("node2".to_string(), tx);
        drop(rx);

        assert!(!links.send(
            "node2",
            PeerMessage::Get {
                key: "x".to_string()
            }
        ));
        assert!(!links.is_connected("node2"));
    }

    #[test]
    fn test_detach() {
        let mut links = PeerLinks::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        links.attach("node2".to_string(), tx);
        links.detach("node2");
        assert!(!links.is_connected("node2"));
        assert!(links.connected().is_empty());
    }
}
