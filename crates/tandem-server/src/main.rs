//! Tandem canvas relay and automation server.
//!
//! Serves one room per process: a WebSocket sync relay backed by a live
//! replica of the shape store, an HTTP endpoint that turns natural-language
//! commands into canvas operations, and periodic snapshots to disk.
//!
//! ## Protocol
//!
//! WebSocket frames are JSON with the following format:
//! ```json
//! { "type": "hello", "user": { "id": "u1", "name": "Ada", "color": "" } }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>" }
//! { "type": "presence", "record": { "user": { ... }, "cursor": { "x": 1, "y": 2 } } }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use dashmap::DashMap;
use serde_json::{json, Value};
use tandem_core::presence::UserDescriptor;
use tandem_core::protocol::{PeerInfo, ServerMessage};
use tandem_core::ShapeStore;
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

mod automation;
mod planner;
mod rate_limit;
mod snapshot;
mod ws;

use planner::Planner;
use rate_limit::RateLimiter;
use snapshot::SnapshotStore;

/// Server configuration
const CHANNEL_CAPACITY: usize = 256;
const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "tandem-server", about = "Relay and automation server for the tandem canvas")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 3030)]
    port: u16,

    /// Room this process serves
    #[arg(long, default_value = "main")]
    room: String,

    /// Directory for room snapshots
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Model name for automation commands
    #[arg(long, default_value = "gpt-4o")]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, default_value = "https://api.openai.com/v1")]
    base_url: String,
}

/// Shared application state
struct AppState {
    /// Room served by this process
    room: String,
    /// The server's own replica; every client update merges here
    store: Mutex<ShapeStore>,
    /// Connected peers by connection id
    peers: DashMap<String, UserDescriptor>,
    /// Broadcast channel carrying (sender id, frame) pairs
    tx: broadcast::Sender<(String, ServerMessage)>,
    limiter: RateLimiter,
    planner: Option<Planner>,
    snapshots: SnapshotStore,
}

impl AppState {
    fn new(
        room: String,
        store: ShapeStore,
        planner: Option<Planner>,
        snapshots: SnapshotStore,
    ) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            room,
            store: Mutex::new(store),
            peers: DashMap::new(),
            tx,
            limiter: RateLimiter::new(),
            planner,
            snapshots,
        }
    }

    /// Broadcast a frame to every connection; receivers drop their own echoes.
    fn broadcast(&self, from: &str, msg: ServerMessage) {
        let _ = self.tx.send((from.to_string(), msg));
    }

    fn peer_list(&self) -> Vec<PeerInfo> {
        self.peers
            .iter()
            .map(|entry| PeerInfo {
                connection_id: entry.key().clone(),
                user: entry.value().clone(),
            })
            .collect()
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let snapshots = SnapshotStore::new(&args.snapshot_dir).unwrap();
    info!("Saving snapshots to {}", snapshots.base_path().display());
    let store = match snapshots.load(&args.room) {
        Ok(Some(bytes)) => match ShapeStore::from_snapshot(&bytes) {
            Ok(store) => {
                info!("Restored {} shape(s) for room {}", store.len(), args.room);
                store
            }
            Err(err) => {
                warn!("Snapshot for room {} is unreadable ({}), starting fresh", args.room, err);
                ShapeStore::new()
            }
        },
        Ok(None) => ShapeStore::new(),
        Err(err) => {
            warn!("Could not read snapshot for room {}: {}", args.room, err);
            ShapeStore::new()
        }
    };

    let planner = Planner::from_env(&args.base_url, &args.model);
    if planner.is_none() {
        warn!("OPENAI_API_KEY is not set; automation commands will be rejected");
    }

    let state = Arc::new(AppState::new(args.room, store, planner, snapshots));

    let autosave = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(AUTOSAVE_INTERVAL);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                save_room(&state).await;
            }
        })
    };

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route(
            "/api/command",
            post(automation::handle_command).options(automation::options_command),
        )
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Tandem relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", args.port);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    autosave.abort();
    save_room(&state).await;
    info!("Final snapshot saved for room {}", state.room);
}

async fn save_room(state: &AppState) {
    let bytes = match state.store.lock().await.snapshot_bytes() {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Snapshot export failed for room {}: {}", state.room, err);
            return;
        }
    };
    if let Err(err) = state.snapshots.save(&state.room, &bytes) {
        warn!("Snapshot save failed for room {}: {}", state.room, err);
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!("Could not listen for shutdown: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

/// Index page
async fn index() -> &'static str {
    "Tandem Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "room": state.room,
        "connections": state.peers.len(),
        "status": "healthy",
    }))
}
