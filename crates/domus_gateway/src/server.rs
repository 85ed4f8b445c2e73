//! Gateway HTTP + WebSocket Server
//!
//! The single ingress for study clients:
//! - `GET /ws` — WebSocket stream carrying tagged JSON events both ways
//! - `GET /health` — health check
//!
//! Each connection gets a generated socket id and a writer task; inbound
//! frames are parsed into `InboundEvent` and handed to the orchestrator,
//! which validates the session itself. The connection binds itself into the
//! socket registry on the first event naming a session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use domus_core::InboundEvent;
use domus_engine::Orchestrator;

use crate::registry::SocketRegistry;

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
    registry: Arc<SocketRegistry>,
}

/// The gateway server. `registry` doubles as the engine's `ClientNotifier`,
/// so the caller constructs it first, injects it into the orchestrator, and
/// hands both back here.
pub struct GatewayServer {
    orchestrator: Orchestrator,
    registry: Arc<SocketRegistry>,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(
        orchestrator: Orchestrator,
        registry: Arc<SocketRegistry>,
        host: &str,
        port: u16,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            host: host.to_string(),
            port,
        }
    }

    /// Start the server. Spawns a background task and returns its handle.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let state = AppState {
            orchestrator: self.orchestrator,
            registry: self.registry,
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/ws", get(ws_upgrade))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let addr = format!("{}:{}", self.host, self.port);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Gateway failed to bind {}: {}", addr, e);
                    return;
                }
            };
            tracing::info!("Gateway listening on {}", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Gateway server error: {}", e);
            }
        })
    }
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// One connection: a writer task draining the registry channel, a read loop
/// feeding the orchestrator.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let socket_id = Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Sessions this connection has bound, for cleanup on close. A study
    // client carries exactly one, but nothing enforces that here.
    let mut bound_sessions: Vec<String> = Vec::new();

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                let event: InboundEvent = match serde_json::from_str(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(socket = %socket_id, "Invalid frame dropped: {}", e);
                        let err = serde_json::json!({ "error": format!("Invalid event: {}", e) });
                        let _ = tx.send(err.to_string());
                        continue;
                    }
                };

                let session_id = event.session_id().to_string();
                if !bound_sessions.contains(&session_id) {
                    state.registry.bind(&session_id, &socket_id, tx.clone());
                    bound_sessions.push(session_id.clone());
                }

                if let Err(e) = state.orchestrator.handle(event, &socket_id).await {
                    tracing::error!(session = %session_id, "Event handling failed: {}", e);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    for session_id in &bound_sessions {
        state.registry.unbind(session_id, &socket_id);
    }
    writer.abort();
    tracing::debug!(socket = %socket_id, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use domus_adapter::NullAdapter;
    use domus_core::DomusConfig;
    use domus_store::StudyStore;

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn test_gateway_server_creates() {
        let registry = Arc::new(SocketRegistry::new());
        let orchestrator = Orchestrator::new(
            Arc::new(StudyStore::new()),
            Arc::new(DomusConfig::default()),
            registry.clone(),
            Arc::new(NullAdapter),
        );
        let server = GatewayServer::new(orchestrator, registry, "127.0.0.1", 0);
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 0);
    }
}
