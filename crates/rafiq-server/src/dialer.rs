//! Outbound peer links
//!
//! Each node dials every other member and keeps the link alive with a
//! reconnect loop. Messages arriving on an outbound link are fed into
//! the coordinator like any inbound traffic, with the link itself as
//! the reply path.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rafiq_cluster::{NodeEvent, ReplySink};
use rafiq_core::types::{Member, PeerMessage};
use rafiq_core::RafiqConfig;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Initial delay between reconnect attempts
const RECONNECT_BASE: Duration = Duration::from_secs(5);
/// Upper bound for the reconnect backoff
const RECONNECT_CAP: Duration = Duration::from_secs(20);

/// Spawn one dial loop per peer, after the configured warm-up delay.
pub fn spawn_dialers(config: Arc<RafiqConfig>, events: UnboundedSender<NodeEvent>) {
    let warm_up = config.cluster.peer_connect_delay();
    for peer in config.peers() {
        let node_id = config.node_id.clone();
        let events = events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(warm_up).await;
            dial_loop(node_id, peer, events).await;
        });
    }
}

async fn dial_loop(node_id: String, peer: Member, events: UnboundedSender<NodeEvent>) {
    let url = peer.peer_url();
    let mut backoff = RECONNECT_BASE;

    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("[{}] Connected to peer {}", node_id, peer.id);
                backoff = RECONNECT_BASE;
                run_link(&node_id, &peer.id, socket, &events).await;
                info!("[{}] Link to {} closed", node_id, peer.id);
                if events
                    .send(NodeEvent::PeerDisconnected {
                        peer: peer.id.clone(),
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                debug!("[{}] Dial {} failed: {}", node_id, peer.id, e);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_CAP);
    }
}

/// Pump one established link until either side drops it.
async fn run_link(
    node_id: &str,
    peer_id: &str,
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    events: &UnboundedSender<NodeEvent>,
) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<PeerMessage>();

    if events
        .send(NodeEvent::PeerConnected {
            peer: peer_id.to_string(),
            link: out_tx.clone(),
        })
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                let Some(msg) = outbound else { break };
                let text = match serde_json::to_string(&msg) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("[{}] Failed to encode message for {}: {}", node_id, peer_id, e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                let frame = match inbound {
                    Some(Ok(f)) => f,
                    Some(Err(e)) => {
                        debug!("[{}] Link to {} errored: {}", node_id, peer_id, e);
                        break;
                    }
                    None => break,
                };
                let text = match frame {
                    Message::Text(t) => t,
                    Message::Close(_) => break,
                    _ => continue,
                };
                match serde_json::from_str::<PeerMessage>(&text) {
                    Ok(msg) => {
                        let event = NodeEvent::PeerInbound {
                            msg,
                            reply: ReplySink::new(out_tx.clone()),
                        };
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("[{}] Malformed frame from {}: {}", node_id, peer_id, e),
                }
            }
        }
    }
}
