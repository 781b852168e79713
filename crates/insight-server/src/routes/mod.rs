//! HTTP route handlers, all mounted under `/api`.

pub mod chat;
pub mod documents;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(documents::routes(max_upload_bytes))
        .merge(chat::routes())
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
