//! # Parley Gateway Crate
//!
//! HTTP and WebSocket surface for the realtime hub.
//!
//! - `GET /ws/{user_id}`: upgrade into an ingress session
//! - `GET /health`: liveness plus the number of open connections
//! - `GET /api/text-filters`: the text filter table for clients

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::{GatewayError, GatewayResult};
pub use state::GatewayState;

use std::sync::Arc;

use axum::{http::Method, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/text-filters", get(routes::list_text_filters))
        .route("/ws/:user_id", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(Arc::new(state))
}
