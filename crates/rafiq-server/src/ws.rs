//! WebSocket endpoints
//!
//! `/cluster/ws` accepts inbound peer connections; `/client/ws` serves
//! clients. Both sides speak line-oriented JSON text frames. Handlers
//! only translate frames into coordinator events and events back into
//! frames; no protocol decisions are made here.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use rafiq_cluster::{ClientHandle, NodeEvent, ReplySink};
use rafiq_core::types::{ClientRequest, PeerMessage};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::server::AppState;

pub async fn peer_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_peer_socket(socket, state))
}

pub async fn client_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client_socket(socket, state))
}

/// Inbound peer connection. Replies to forwarded messages travel back
/// over this same socket via the per-connection reply sink.
async fn handle_peer_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<PeerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = reply_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to encode peer reply: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                debug!("Peer socket error: {}", e);
                break;
            }
        };
        let text = match frame {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<PeerMessage>(text.as_str()) {
            Ok(msg) => {
                let event = NodeEvent::PeerInbound {
                    msg,
                    reply: ReplySink::new(reply_tx.clone()),
                };
                if state.events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Malformed peer frame: {}", e),
        }
    }

    writer.abort();
}

/// Client connection. The client gets the full store on connect, direct
/// replies to its own requests and the shared change notifications.
async fn handle_client_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let client_id = state.next_client_id();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel();
    let mut changes = state.notifier.subscribe();

    let handle = ClientHandle::new(client_id, direct_tx);
    if state
        .events
        .send(NodeEvent::ClientConnected {
            client: handle.clone(),
        })
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(ev) => ev,
                    None => break,
                },
                shared = changes.recv() => match shared {
                    Ok(ev) => ev,
                    // A lagged subscriber just misses notifications;
                    // its own replies still arrive on the direct path
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Client {} lagged {} notifications", client_id, n);
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            };
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Failed to encode client event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                debug!("Client {} socket error: {}", client_id, e);
                break;
            }
        };
        let text = match frame {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientRequest>(text.as_str()) {
            Ok(request) => {
                let event = NodeEvent::ClientRequest {
                    client: handle.clone(),
                    request,
                };
                if state.events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Client {} sent malformed frame: {}", client_id, e),
        }
    }

    debug!("Client {} disconnected", client_id);
    writer.abort();
}
