// src/coordinator.rs
//! The manager's state machine.
//!
//! ```text
//! validate -> check status is `generating` -> generate cluster bundle
//!   -> `managerdone` -> start receiver -> wait for nodes
//!   -> assemble -> `agentdone`            (every node reported)
//!   -> `error`                            (any fatal failure after the precondition)
//! ```
//!
//! Configuration, precondition and status-store failures are returned as
//! `Err`; everything else ends in a terminal state described by `RunReport`.

use crate::assembler::{Archive, BundleAssembler};
use crate::barrier::{CompletionBarrier, WaitError};
use crate::collect::ClusterBundleGenerator;
use crate::constants;
use crate::error::{BundleError, Result};
use crate::receiver::NodeBundleReceiver;
use crate::request::{BundleRequest, LingerPolicy};
use crate::runtime::ManagerRuntime;
use crate::server::{Server, ServerConfig};
use crate::sources::{ClusterDataSource, ExternalBundleSource, IssueInfo, LogSource};
use crate::state::BundleState;
use crate::status::StatusStore;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Everything the coordinator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub data: Arc<dyn ClusterDataSource>,
    pub logs: Arc<dyn LogSource>,
    pub external: Option<Arc<dyn ExternalBundleSource>>,
    pub status: Arc<dyn StatusStore>,
}

impl Collaborators {
    pub fn new(
        data: Arc<dyn ClusterDataSource>,
        logs: Arc<dyn LogSource>,
        status: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            data,
            logs,
            external: None,
            status,
        }
    }

    pub fn with_external(mut self, external: Arc<dyn ExternalBundleSource>) -> Self {
        self.external = Some(external);
        self
    }
}

/// Running node receiver listener
pub struct ServerHandle {
    addr: SocketAddr,
    runtime: ManagerRuntime,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits for in-flight requests
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.runtime.trigger_shutdown();
        join_server(self.task).await
    }

    /// Keeps serving downloads according to `policy`, then stops
    pub async fn linger(mut self, policy: LingerPolicy) -> anyhow::Result<()> {
        match policy {
            LingerPolicy::Forever => {
                log::info!(
                    "[Coordinator] Serving http://{} until stopped (Ctrl+C)",
                    self.addr
                );
            }
            LingerPolicy::For(grace) => {
                log::info!(
                    "[Coordinator] Serving http://{} for {:?}",
                    self.addr,
                    grace
                );
                match tokio::time::timeout(grace, &mut self.task).await {
                    Ok(result) => return flatten(result),
                    Err(_) => self.runtime.trigger_shutdown(),
                }
            }
            LingerPolicy::Exit => self.runtime.trigger_shutdown(),
        }
        join_server(self.task).await
    }
}

async fn join_server(task: JoinHandle<std::io::Result<()>>) -> anyhow::Result<()> {
    flatten(task.await)
}

fn flatten(
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    result
        .context("Server task panicked")?
        .context("Server error")?;
    log::info!("[Coordinator] Node receiver stopped");
    Ok(())
}

/// How a run ended
pub struct RunReport {
    pub state: BundleState,
    /// Present iff `state` is `AgentDone`
    pub archive: Option<Archive>,
    /// Detail published with an `Error` state
    pub detail: Option<String>,
    /// Recovered collection failures written to the error log
    pub collection_errors: usize,
    /// The listener, when it was started
    pub server: Option<ServerHandle>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == BundleState::AgentDone
    }

    /// Applies the linger policy to the listener, if one is running
    pub async fn linger(&mut self, policy: LingerPolicy) -> anyhow::Result<()> {
        match self.server.take() {
            Some(server) => server.linger(policy).await,
            None => Ok(()),
        }
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        match self.server.take() {
            Some(server) => server.shutdown().await,
            None => Ok(()),
        }
    }
}

pub struct Coordinator {
    request: BundleRequest,
    collaborators: Collaborators,
    addr_notifier: Option<oneshot::Sender<SocketAddr>>,
}

impl Coordinator {
    pub fn new(request: BundleRequest, collaborators: Collaborators) -> Self {
        Self {
            request,
            collaborators,
            addr_notifier: None,
        }
    }

    /// Reports the listener's bound address once it is accepting uploads
    pub fn with_addr_notifier(mut self, notifier: oneshot::Sender<SocketAddr>) -> Self {
        self.addr_notifier = Some(notifier);
        self
    }

    pub fn request(&self) -> &BundleRequest {
        &self.request
    }

    pub async fn run(mut self) -> Result<RunReport> {
        self.request.validate()?;
        let name = self.request.name.clone();
        log::info!(
            "[Coordinator] Running support bundle manager for {}/{} ({} nodes)",
            self.request.namespace,
            name,
            self.request.node_count
        );

        self.check_start_state(&name).await?;

        let working_dir = self.request.working_dir();
        let issue = IssueInfo {
            url: self.request.issue_url.clone(),
            description: self.request.issue_description.clone(),
        };
        let generated = ClusterBundleGenerator::new(
            &working_dir,
            self.collaborators.data.as_ref(),
            self.collaborators.logs.as_ref(),
        )
        .with_log_namespaces(&self.request.log_namespaces)
        .with_issue(issue)
        .with_external(self.collaborators.external.as_deref())
        .generate()
        .await;

        let generated = match generated {
            Ok(generated) => generated,
            Err(e) => return self.fail(&name, e, 0, None).await,
        };
        let collection_errors = generated.failures.len();
        self.publish(&name, BundleState::ManagerDone).await?;

        let barrier = Arc::new(CompletionBarrier::new(self.request.node_count));
        let receiver = Arc::new(NodeBundleReceiver::new(&working_dir, Arc::clone(&barrier)));
        let server = match self.start_server(Arc::clone(&receiver)).await {
            Ok(server) => server,
            Err(e) => {
                let e = BundleError::Configuration(format!("fail to start node receiver: {:#}", e));
                return self.fail(&name, e, collection_errors, None).await;
            }
        };

        let deadline = match tokio::time::Instant::now().checked_add(self.request.wait_timeout) {
            Some(deadline) => deadline,
            None => {
                let e = BundleError::Configuration(format!(
                    "wait timeout {:?} is out of range",
                    self.request.wait_timeout
                ));
                return self.fail(&name, e, collection_errors, Some(server)).await;
            }
        };
        log::info!(
            "[Coordinator] Waiting for {} node bundles (timeout {:?})",
            barrier.expected(),
            self.request.wait_timeout
        );
        let archive = match barrier.wait(deadline).await {
            Ok(reported) => {
                log::info!("[Coordinator] All {} nodes reported", reported);
                BundleAssembler::new(&self.request.output_dir, &working_dir)
                    .assemble(&generated.meta.archive_filename())
                    .await
            }
            Err(WaitError::TimedOut { reported, expected }) => Err(BundleError::Timeout {
                reported,
                expected,
                timeout_secs: self.request.wait_timeout.as_secs(),
            }),
            Err(e @ WaitError::AlreadyConsumed) => Err(BundleError::Assembly(e.to_string())),
        };

        let archive = match archive {
            Ok(archive) => archive,
            Err(e) => return self.fail(&name, e, collection_errors, Some(server)).await,
        };

        let done = self
            .collaborators
            .status
            .set_done(&name, BundleState::AgentDone, &archive.name, archive.size)
            .await;
        if let Err(e) = done {
            let _ = server.shutdown().await;
            return Err(propagation_error(BundleState::AgentDone, e));
        }
        receiver.publish_archive(archive.clone());
        log::info!(
            "[Coordinator] Support bundle {} ready ({} bytes)",
            archive.name,
            archive.size
        );

        Ok(RunReport {
            state: BundleState::AgentDone,
            archive: Some(archive),
            detail: None,
            collection_errors,
            server: Some(server),
        })
    }

    async fn check_start_state(&self, name: &str) -> Result<()> {
        let state = self
            .collaborators
            .status
            .get_state(name)
            .await
            .map_err(|e| BundleError::StatusPropagation {
                state: BundleState::Generating.to_string(),
                reason: format!("cannot read current state: {:#}", e),
            })?;

        if state != BundleState::Generating {
            return Err(BundleError::Precondition {
                expected: BundleState::Generating.to_string(),
                found: state.to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, name: &str, state: BundleState) -> Result<()> {
        log::info!("[Coordinator] {} -> {}", name, state);
        self.collaborators
            .status
            .set_state(name, state)
            .await
            .map_err(|e| propagation_error(state, e))
    }

    /// Records `error` as the terminal state
    async fn fail(
        &self,
        name: &str,
        error: BundleError,
        collection_errors: usize,
        server: Option<ServerHandle>,
    ) -> Result<RunReport> {
        let detail = error.to_string();
        log::error!("[Coordinator] {}", detail);

        let recorded = self
            .collaborators
            .status
            .set_error(name, BundleState::Error, &detail)
            .await;
        if let Err(e) = recorded {
            if let Some(server) = server {
                let _ = server.shutdown().await;
            }
            return Err(propagation_error(BundleState::Error, e));
        }

        Ok(RunReport {
            state: BundleState::Error,
            archive: None,
            detail: Some(detail),
            collection_errors,
            server,
        })
    }

    async fn start_server(
        &mut self,
        receiver: Arc<NodeBundleReceiver>,
    ) -> anyhow::Result<ServerHandle> {
        let config = ServerConfig {
            bundle_name: self.request.name.clone(),
            max_upload_bytes: self.request.max_upload_bytes,
            version: constants::VERSION.to_string(),
        };
        let app = Server::new(receiver, config).router();

        let listener = tokio::net::TcpListener::bind(self.request.listen)
            .await
            .with_context(|| format!("Failed to bind to {}", self.request.listen))?;
        let addr = listener.local_addr()?;

        let runtime = ManagerRuntime::new();
        let shutdown = runtime.create_shutdown_future();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        });
        log::info!("[Coordinator] Node receiver listening on http://{}", addr);

        if let Some(notifier) = self.addr_notifier.take() {
            let _ = notifier.send(addr);
        }

        Ok(ServerHandle {
            addr,
            runtime,
            task,
        })
    }
}

fn propagation_error(state: BundleState, e: anyhow::Error) -> BundleError {
    let error = BundleError::StatusPropagation {
        state: state.to_string(),
        reason: format!("{:#}", e),
    };
    log::error!("[Coordinator] {}", error);
    error
}
