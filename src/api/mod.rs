// src/api/mod.rs

pub mod error;
pub mod http;
pub mod ws;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The complete HTTP + WebSocket surface.
pub fn router(state: AppState) -> Router {
    http::routes()
        .merge(ws::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
