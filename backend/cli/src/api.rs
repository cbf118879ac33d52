use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::BroadcastStream;

use cadence_core::{Alert, Message, PollRequest, RuleSource};
use cadence_scheduler::CycleReport;
use cadence_store::RuleStore;
use cadence_supervisor::Supervisor;

const DEFAULT_ALERT_LIMIT: usize = 50;

/// Shared application state for API handlers.
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub rules: RuleStore,
    pub status_rx: watch::Receiver<CycleReport>,
    pub scheduler_tx: mpsc::Sender<Message>,
    pub broadcast_tx: broadcast::Sender<Alert>,
}

/// Build the Axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/rules", get(list_rules))
        .route("/api/alerts", get(get_alerts))
        .route("/api/poll", post(trigger_poll))
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// WebSocket stream of alerts as the supervisor raises them.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut stream = BroadcastStream::new(state.broadcast_tx.subscribe());

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(alert) => {
                if let Ok(json) = serde_json::to_string(&alert) {
                    if socket.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Alert stream lagged or closed");
                break;
            }
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "cadence",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// The most recent cycle report.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<CycleReport> {
    Json(state.status_rx.borrow().clone())
}

async fn list_rules(State(state): State<Arc<AppState>>) -> Result<Json<Value>, StatusCode> {
    match state.rules.list_rules().await {
        Ok(rules) => Ok(Json(json!({ "rules": rules }))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list rules");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
    limit: Option<usize>,
}

async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<Value>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    match state.supervisor.recent_alerts(limit).await {
        Ok(alerts) => Ok(Json(json!({ "alerts": alerts }))),
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch alerts");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Ask the scheduler for a cycle at its next idle boundary.
async fn trigger_poll(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let msg = Message::PollNow(PollRequest {
        reason: "requested via API".to_string(),
    });
    state.scheduler_tx.send(msg).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to send poll request to scheduler");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "poll_requested" }))))
}
