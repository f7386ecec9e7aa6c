//! HTTP surface of the coordinator.
//!
//! One WebSocket endpoint carries the whole experiment protocol; the
//! rest is auxiliary: a liveness probe, static hint images, and a
//! decision-log export.

use std::path::Path;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use ractor::ActorRef;
use serde_json::json;
use tower_http::services::ServeDir;

pub mod logs;
pub mod websocket;

use crate::actors::session::SessionMsg;

#[derive(Clone)]
pub struct ApiState {
    pub session: ActorRef<SessionMsg>,
}

/// Configure all routes. `assets_dir` backs `/images`; missing files
/// come back as plain 404s.
pub fn router(assets_dir: &Path) -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .route("/logs/decisions.jsonl", get(logs::export_decisions_jsonl))
        .nest_service("/images", ServeDir::new(assets_dir))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "lab-coordinator",
    }))
}
