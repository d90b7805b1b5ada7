// ============================
// watchparty-backend/src/ws_router.rs
// ============================
//! WebSocket router and HTTP endpoints.
use crate::error::AppError;
use crate::handshake::HandshakeQuery;
use crate::metrics as keys;
use crate::room::RoomSnapshot;
use crate::websocket::WebSocketHandler;
use crate::AppState;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::{counter, gauge};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Body of `POST /rooms/{room_id}/end`
#[derive(Debug, Deserialize)]
pub struct EndPartyRequest {
    #[serde(default = "default_end_reason")]
    pub reason: String,
    #[serde(default = "default_end_message")]
    pub message: String,
}

fn default_end_reason() -> String {
    "party-deleted".to_string()
}

fn default_end_message() -> String {
    "This watch party has ended.".to_string()
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room_id}", get(room_snapshot))
        .route("/rooms/{room_id}/end", post(end_party))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Handler for WebSocket connections.
///
/// The handshake is validated before upgrading; a malformed one is answered
/// with 400 and never reaches a room.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let handshake = match query.validate(&state.settings.limits) {
        Ok(handshake) => handshake,
        Err(e) => {
            counter!(keys::WS_REJECTED).increment(1);
            warn!(error = %e, "Rejected handshake");
            return Err(e);
        },
    };
    counter!(keys::WS_CONNECTION).increment(1);

    Ok(ws.on_upgrade(move |socket| async move {
        gauge!(keys::WS_ACTIVE).increment(1.0);
        WebSocketHandler::new(state, handshake).run(socket).await;
        gauge!(keys::WS_ACTIVE).decrement(1.0);
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "rooms": state.registry.room_count(),
    }))
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "rooms": state.registry.room_ids() }))
}

async fn room_snapshot(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    let handle = state
        .registry
        .get_room(&room_id)
        .ok_or_else(|| AppError::RoomNotFound(room_id.clone()))?;
    // The room may retire between lookup and reply
    let snapshot = handle
        .snapshot()
        .await
        .map_err(|_| AppError::RoomNotFound(room_id))?;
    Ok(Json(snapshot))
}

async fn end_party(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(request): Json<EndPartyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let notified = state
        .registry
        .end_party(&room_id, request.reason, request.message)
        .await?;
    info!(room_id = %room_id, notified, "Party ended by request");
    Ok(Json(json!({ "roomId": room_id, "notified": notified })))
}
