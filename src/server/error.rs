// Error handling utilities and response helpers

use crate::error::IngestionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Helper to create a JSON error response
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({"error": message}))).into_response()
}

/// Helper for "not found" errors
pub fn not_found(message: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, message)
}

/// Helper for internal server errors
pub fn internal_error(message: &str) -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Rejected node upload, answered with the status its category maps to
pub fn ingestion_error(e: &IngestionError) -> Response {
    json_error(e.status_code(), &e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ingestion_error_response() {
        let response = ingestion_error(&IngestionError::InvalidNodeId("a/b".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "invalid node id 'a/b'");

        let response = ingestion_error(&IngestionError::Write {
            node: "a".into(),
            reason: "disk full".into(),
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let message = String::from("Support bundle is not ready");
        let response = not_found(&message);
        drop(message);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Support bundle is not ready");
    }
}
