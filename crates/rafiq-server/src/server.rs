//! Node server implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use rafiq_cluster::{Coordinator, NodeEvent};
use rafiq_core::types::ClientEvent;
use rafiq_core::{RafiqConfig, Result};
use rafiq_store::{FileBackend, LocalStore};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedSender};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info};

use crate::dialer;
use crate::ws;

/// Application state shared across WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RafiqConfig>,
    pub events: UnboundedSender<NodeEvent>,
    pub notifier: broadcast::Sender<ClientEvent>,
    next_client_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// The per-node server: coordinator task, timers, dialer and the
/// WebSocket listener.
pub struct NodeServer {
    config: RafiqConfig,
}

impl NodeServer {
    pub fn new(config: RafiqConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        // Load the durable blob; a corrupt blob costs the data but not
        // the node
        let backend = FileBackend::for_node(&config.storage.data_dir, &config.node_id);
        let mut store = LocalStore::new(config.cluster.max_store_size, Box::new(backend));
        if let Err(e) = store.load() {
            error!("[{}] Failed to load store blob: {}", config.node_id, e);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(&config, store, events_tx.clone());
        let notifier = coordinator.notifier();
        tokio::spawn(coordinator.run(events_rx));

        spawn_timers(&config, events_tx.clone());
        dialer::spawn_dialers(Arc::clone(&config), events_tx.clone());

        let state = AppState {
            config: Arc::clone(&config),
            events: events_tx,
            notifier,
            next_client_id: Arc::new(AtomicU64::new(1)),
        };

        let app = Router::new()
            .route("/cluster/ws", get(ws::peer_ws))
            .route("/client/ws", get(ws::client_ws))
            .route("/health", get(health))
            .with_state(state)
            .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()));

        let addr = format!("{}:{}", config.server.bind_address, config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("[{}] Listening on {}", config.node_id, addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "node": state.config.node_id,
        "version": rafiq_core::VERSION,
    }))
}

/// Start the protocol timers: heartbeat send, liveness check and the
/// one-shot startup snapshot pass. Each is a task posting plain events
/// into the coordinator channel, preserving its single-task semantics.
fn spawn_timers(config: &RafiqConfig, events: UnboundedSender<NodeEvent>) {
    let heartbeat_interval = config.cluster.heartbeat_interval();
    let check_interval = config.cluster.check_interval();
    let snapshot_delay = config.cluster.snapshot_request_delay();

    {
        let events = events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                if events.send(NodeEvent::SendHeartbeats).is_err() {
                    break;
                }
            }
        });
    }

    {
        let events = events.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if events.send(NodeEvent::CheckLiveness).is_err() {
                    break;
                }
            }
        });
    }

    tokio::spawn(async move {
        tokio::time::sleep(snapshot_delay).await;
        let _ = events.send(NodeEvent::RequestSnapshots);
    });
}
