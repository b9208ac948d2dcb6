// Node bundle upload

use crate::server::ServerState;
use crate::server::error::ingestion_error;
use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

pub async fn handle_node_upload(
    State(state): State<ServerState>,
    Path(node): Path<String>,
    body: Body,
) -> Response {
    match state.receiver.ingest(&node, body.into_data_stream()).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            axum::Json(json!({
                "node": outcome.node_id,
                "bytes": outcome.bytes,
                "reported": state.receiver.barrier().reported(),
                "expected": state.receiver.barrier().expected(),
            })),
        )
            .into_response(),
        Err(e) => ingestion_error(&e),
    }
}
