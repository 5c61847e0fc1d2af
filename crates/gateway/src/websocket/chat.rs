//! Chat WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::admission::{admit, extract_token, log_rejection};
use crate::error::CloseReason;
use crate::state::GatewayState;

use super::session::{close_frame, run_session};

#[derive(Debug, Default, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// Admit or refuse a connection to `/ws/chat/:room_id`.
///
/// Every check runs before the upgrade completes. A refused client still
/// gets a websocket, but the only frame on it is a close frame whose code
/// says why.
pub async fn chat_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Path(room_id): Path<String>,
    Query(query): Query<WebSocketQuery>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(query.token.as_deref(), &jar, &headers);

    match admit(&state.validator, state.rooms.as_ref(), token, &room_id).await {
        Ok(admission) => {
            let gateway = GatewayState::clone(&state);
            ws.on_upgrade(move |socket| async move {
                run_session(socket, gateway, admission).await;
            })
        }
        Err(error) => {
            log_rejection(&error, &room_id);
            let reason = error.close_reason();
            ws.on_upgrade(move |socket| reject(socket, reason))
        }
    }
}

async fn reject(mut socket: WebSocket, reason: CloseReason) {
    let _ = socket.send(Message::Close(Some(close_frame(reason)))).await;
}
