//! The coordinator's event vocabulary
//!
//! Everything that can happen to a node arrives here: peer link
//! transitions, inbound peer messages, client traffic and timer ticks.
//! Timers are plain events too, posted by spawned sleeps, which keeps
//! every handler a run-to-completion step of one task.

use rafiq_core::types::{ClientEvent, ClientRequest, NodeId, PeerMessage};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Events consumed by the coordinator task
#[derive(Debug)]
pub enum NodeEvent {
    /// Outbound link to a peer came up
    PeerConnected {
        peer: NodeId,
        link: UnboundedSender<PeerMessage>,
    },

    /// Outbound link to a peer went down
    PeerDisconnected { peer: NodeId },

    /// A message arrived from a peer, on either an inbound or an
    /// outbound connection. `reply` answers over the same connection.
    PeerInbound { msg: PeerMessage, reply: ReplySink },

    /// A client connected and wants the initial store dump
    ClientConnected { client: ClientHandle },

    /// A client issued a request
    ClientRequest {
        client: ClientHandle,
        request: ClientRequest,
    },

    /// Time to emit heartbeats to connected peers
    SendHeartbeats,

    /// Time to run the liveness check
    CheckLiveness,

    /// Startup snapshot-request delay elapsed
    RequestSnapshots,

    /// Stagger delay for a forwarded get elapsed
    GetStagger { key: String, seq: u64 },

    /// Overall deadline for a forwarded get elapsed
    GetTimeout { key: String, seq: u64 },
}

/// Connection-scoped reply channel for inbound peer messages.
///
/// Forwarded gets are answered over the connection they arrived on. A
/// sink may also be empty (e.g. in tests, or when the transport offers
/// no reply path), in which case replies are silently dropped.
#[derive(Debug, Clone)]
pub struct ReplySink(Option<UnboundedSender<PeerMessage>>);

impl ReplySink {
    pub fn new(tx: UnboundedSender<PeerMessage>) -> Self {
        Self(Some(tx))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn send(&self, msg: PeerMessage) {
        match &self.0 {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!("Reply connection gone, dropping reply");
                }
            }
            None => debug!("No reply path, dropping reply"),
        }
    }
}

/// Handle to a connected client, used for direct replies.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: u64,
    tx: UnboundedSender<ClientEvent>,
}

impl ClientHandle {
    pub fn new(id: u64, tx: UnboundedSender<ClientEvent>) -> Self {
        Self { id, tx }
    }

    pub fn send(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            debug!("Client {} gone, dropping event", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_empty_sink_drops_silently() {
        let sink = ReplySink::none();
        sink.send(PeerMessage::Get {
            key: "x".to_string(),
        });
    }

    #[test]
    fn test_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ReplySink::new(tx);
        sink.send(PeerMessage::Value {
            key: "x".to_string(),
            value: None,
        });
        assert!(rx.try_recv().is_ok());
    }
}
