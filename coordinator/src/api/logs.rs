//! Decision-log export.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::actors::session::SessionMsg;
use crate::api::ApiState;

/// Completed rounds as JSON Lines, one round per line. Empty body
/// while no round has completed yet.
pub async fn export_decisions_jsonl(State(state): State<ApiState>) -> impl IntoResponse {
    match ractor::call!(state.session, |reply| SessionMsg::ExportDecisions { reply }) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "application/x-ndjson; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "application/json")],
            json!({ "error": format!("session actor unavailable: {e}") }).to_string(),
        )
            .into_response(),
    }
}
