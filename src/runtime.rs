//! Shutdown coordination for the node receiver's HTTP listener
// Runtime module - one shutdown signal shared by Ctrl+C and the linger policy
use std::future::Future;
use tokio::signal;
use tokio::sync::watch;

/// Lightweight shutdown coordination for the manager's listener
#[derive(Clone)]
pub struct ManagerRuntime {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ManagerRuntime {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Get a receiver to watch for shutdown signals
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Trigger a programmatic shutdown
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Create a unified shutdown future that responds to both Ctrl+C and programmatic shutdown
    /// Use this with axum's `with_graceful_shutdown()`
    pub fn create_shutdown_future(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.shutdown_rx.clone();

        async move {
            if *shutdown_rx.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = signal::ctrl_c() => {
                    log::info!("[Runtime] Shutdown signal (Ctrl+C) received");
                }
                _ = shutdown_rx.changed() => {
                    log::debug!("[Runtime] Shutdown triggered");
                }
            }
        }
    }
}

impl Default for ManagerRuntime {
    fn default() -> Self {
        Self::new()
    }
}
