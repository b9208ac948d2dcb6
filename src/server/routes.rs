// Route setup and configuration

use crate::receiver::NodeBundleReceiver;
use crate::server::config::ServerConfig;
use crate::server::{ServerState, handle_download, handle_node_upload, handle_status};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

pub fn create_router(
    receiver: Arc<NodeBundleReceiver>,
    config: ServerConfig,
    start_time: Instant,
) -> Router {
    let max_upload_bytes = config.max_upload_bytes;

    Router::new()
        .route("/bundle/nodes/{node}", post(handle_node_upload))
        .route("/bundle/download", get(handle_download))
        .route("/bundle/status", get(handle_status))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(max_upload_bytes)))
        .with_state(ServerState {
            receiver,
            config,
            start_time,
        })
}
