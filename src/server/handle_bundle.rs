// Final archive download

use crate::server::ServerState;
use crate::server::error::{internal_error, not_found};
use crate::server::utils::bundle_download_headers;
use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

pub async fn handle_download(State(state): State<ServerState>) -> Response {
    let Some(archive) = state.receiver.archive() else {
        return not_found("Support bundle is not ready");
    };

    match tokio::fs::File::open(&archive.path).await {
        Ok(file) => {
            log::info!("[Server] Serving {} ({} bytes)", archive.name, archive.size);
            let body = Body::from_stream(ReaderStream::new(file));
            let headers = bundle_download_headers("application/zip", &archive.name, archive.size);
            (StatusCode::OK, headers, body).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            not_found("Support bundle is not ready")
        }
        Err(e) => {
            log::error!("[Server] Failed to open {}: {}", archive.path.display(), e);
            internal_error(&e.to_string())
        }
    }
}
