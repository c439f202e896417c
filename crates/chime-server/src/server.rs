//! Axum router: WebSocket upgrade, agent creation, health.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chime_core::agent::AgentCreationRequest;
use chime_core::errors::PipelineError;
use chime_core::ids::ConnectionId;
use chime_pipeline::pipeline::AgentCreationPipeline;
use chime_pipeline::progress_manager::ProgressManager;

use crate::connection::SubscriberConnection;
use crate::handler;
use crate::manager::WebSocketManager;

/// Outbound queue depth per subscriber.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    /// The agent-creation pipeline.
    pub pipeline: Arc<AgentCreationPipeline>,
    /// Subscriber connection manager.
    pub manager: Arc<WebSocketManager>,
    /// Progress session table.
    pub progress: Arc<ProgressManager>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// Bundle the shared components.
    #[must_use]
    pub fn new(
        pipeline: Arc<AgentCreationPipeline>,
        manager: Arc<WebSocketManager>,
        progress: Arc<ProgressManager>,
    ) -> Self {
        Self {
            pipeline,
            manager,
            progress,
            start_time: Instant::now(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/agents", post(create_agent_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// GET /health payload.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    active_sessions: usize,
    pipeline_mode: &'static str,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.manager.connection_count(),
        active_sessions: state.progress.get_active_sessions().len(),
        pipeline_mode: state.pipeline.get_service_status().pipeline_mode,
    })
}

/// POST /agents: run the pipeline end to end for one request.
async fn create_agent_handler(
    State(state): State<AppState>,
    Json(request): Json<AgentCreationRequest>,
) -> Response {
    match state.pipeline.create_agent(request).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            let status = match &e {
                PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(serde_json::json!({
                    "error": e.to_string(),
                    "code": e.code(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /ws: upgrade and serve the subscriber protocol.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection read loop plus a write task draining the outbound queue.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_QUEUE_DEPTH);
    let connection = Arc::new(SubscriberConnection::new(ConnectionId::generate(), tx));
    let conn_id = connection.id().clone();
    state.manager.register(Arc::clone(&connection)).await;
    info!(conn_id = %conn_id, "subscriber connected");

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink
                .send(Message::Text(message.as_str().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let reply = handler::dispatch(&state.progress, &connection, text.as_str());
                if !connection.send_json(&reply) {
                    warn!(conn_id = %conn_id, "reply dropped, outbound queue full");
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are ignored.
            _ => {}
        }
    }

    state.manager.unregister(&conn_id).await;
    write_task.abort();
    debug!(conn_id = %conn_id, "subscriber disconnected");
}
