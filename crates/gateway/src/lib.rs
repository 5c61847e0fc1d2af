//! # Huddle Gateway Crate
//!
//! The HTTP and WebSocket surface of Huddle. Clients connect to
//! `/ws/chat/:room_id`, are admitted with a bearer token, receive the room's
//! history and then exchange chat messages and typing signals with everyone
//! else in the room.
//!
//! ## Architecture
//!
//! - **Admission**: token extraction, credential and room checks, close codes
//! - **Registry**: live room membership and the per-room ordering lock
//! - **Broadcast**: non-blocking fan-out to room members
//! - **WebSocket**: wire events and the per-connection session
//! - **Middleware**: request logging and tracing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use huddle_gateway::{create_router, GatewayState};
//!
//! let state = GatewayState::new(validator, messages, rooms, config.realtime);
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7070").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod admission;
pub mod broadcast;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod state;
pub mod websocket;

pub use admission::{Admission, AdmissionError, TokenSource};
pub use broadcast::Broadcaster;
pub use error::CloseReason;
pub use registry::{Membership, RoomRegistry, SessionHandle};
pub use state::GatewayState;

pub use create_router as build_router;

use axum::{http::Method, middleware as axum_middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let arc_state = Arc::new(state);
    Router::new()
        .route("/health", get(health_check))
        .merge(websocket::create_websocket_routes().with_state(arc_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(Any),
        )
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(middleware::create_trace_middleware())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
