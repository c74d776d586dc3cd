use std::sync::Arc;

use axum::{
    extract::Path,
    extract::State,
    extract::ws::{WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use crate::{app_state::AppState, protocol::WebSocketConnection};

/// Upgrade `GET /ws/:session_id` and hand the socket to the session multiplexer
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

pub async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let connection = Arc::new(WebSocketConnection::new(Uuid::new_v4().to_string(), socket));
    let outcome = state.session_handler.run(&session_id, connection).await;
    info!(
        "WebSocket stream for session {} finished: {:?}",
        outcome.session_id, outcome.trigger
    );
}
