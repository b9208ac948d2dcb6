// HTTP surface of the manager
// Nodes push their bundles here and callers download the final archive

mod config;
mod error;
mod handle_bundle;
mod handle_node;
mod handle_status;
mod routes;
mod utils;

use crate::receiver::NodeBundleReceiver;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;

pub use config::ServerConfig;
pub use utils::parse_duration;

pub(crate) use handle_bundle::handle_download;
pub(crate) use handle_node::handle_node_upload;
pub(crate) use handle_status::handle_status;

pub struct Server {
    receiver: Arc<NodeBundleReceiver>,
    config: ServerConfig,
    start_time: Instant,
}

impl Server {
    pub fn new(receiver: Arc<NodeBundleReceiver>, config: ServerConfig) -> Self {
        Self {
            receiver,
            config,
            start_time: Instant::now(),
        }
    }

    pub fn router(&self) -> Router {
        routes::create_router(
            Arc::clone(&self.receiver),
            self.config.clone(),
            self.start_time,
        )
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub receiver: Arc<NodeBundleReceiver>,
    pub config: ServerConfig,
    pub start_time: Instant,
}
