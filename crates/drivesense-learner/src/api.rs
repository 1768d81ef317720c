//! HTTP/WebSocket adapter
//!
//! Thin boundary over the runtime: JSON ingress for actions and feedback,
//! read-only views of the engine, Prometheus text, and a WebSocket stream of
//! outbound messages.

use crate::engine::{Engine, IngestOutcome};
use crate::runtime::RuntimeHandle;
use crate::telemetry::BroadcastSink;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use drivesense_common::{DriveSenseError, RawActionRecord, RawFeedbackRecord};
use futures::{sink::SinkExt, stream::StreamExt};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub runtime: RuntimeHandle,
    pub outbound: BroadcastSink,
    pub registry: Registry,
}

/// Error body returned by every route
pub struct ApiError(DriveSenseError);

impl From<DriveSenseError> for ApiError {
    fn from(err: DriveSenseError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DriveSenseError::Validation(_) => StatusCode::BAD_REQUEST,
            DriveSenseError::UnknownReference { .. } => StatusCode::NOT_FOUND,
            DriveSenseError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/actions", post(submit_action))
        .route("/v1/feedback", post(submit_feedback))
        .route("/v1/suggestions", get(list_suggestions))
        .route("/v1/users/:user_id/profiles", get(user_profiles))
        .route("/v1/status", get(status))
        .route("/v1/recommendations/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "drivesense",
        "version": drivesense_common::VERSION,
        "phase": state.engine.phase(),
    }))
}

async fn submit_action(
    State(state): State<AppState>,
    Json(raw): Json<RawActionRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.runtime.submit_action(raw).await?;
    let status = match outcome {
        IngestOutcome::Recorded { .. } => StatusCode::CREATED,
        IngestOutcome::Duplicate { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

async fn submit_feedback(
    State(state): State<AppState>,
    Json(raw): Json<RawFeedbackRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.runtime.submit_feedback(raw).await?;
    Ok(Json(report))
}

async fn list_suggestions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.pending(Utc::now()))
}

async fn user_profiles(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.profiles(&user_id))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.status(Utc::now()))
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|e| DriveSenseError::Internal(format!("metrics encoding failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buffer))
}

async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.outbound.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let message = match rx.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket subscriber lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
    debug!("WebSocket client disconnected");
}
