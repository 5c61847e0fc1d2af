//! WebSocket endpoints for the gateway

pub mod chat;
pub mod events;
pub mod session;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::state::GatewayState;

/// Create all WebSocket routes
pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/ws/chat/:room_id", get(chat::chat_websocket_handler))
        .route("/ws/chat/:room_id/", get(chat::chat_websocket_handler))
}

pub use chat::chat_websocket_handler;
pub use events::{ClientEvent, HistoryEntry, InboundError, ServerEvent};
pub use session::{run_session, SessionEnd, SessionState};
