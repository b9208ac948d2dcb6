// Barrier and archive status

use crate::server::ServerState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

pub async fn handle_status(State(state): State<ServerState>) -> impl IntoResponse {
    let barrier = state.receiver.barrier().snapshot();
    let archive = state
        .receiver
        .archive()
        .map(|archive| json!({"name": archive.name, "size": archive.size}));

    let response = json!({
        "server": {
            "version": state.config.version,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "bundle": {
            "name": state.config.bundle_name,
            "expected": barrier.expected,
            "reported": barrier.reported,
            "nodes": barrier.nodes,
            "released": barrier.released,
            "expired": barrier.expired,
            "archive": archive,
        }
    });

    (StatusCode::OK, axum::Json(response))
}
