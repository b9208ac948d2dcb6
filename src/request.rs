// Bundle request configuration

use crate::constants;
use crate::error::{BundleError, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// What the manager does once the run reached a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LingerPolicy {
    /// Keep serving the download endpoint until the process is stopped
    #[default]
    Forever,
    /// Keep serving for a grace period, then exit
    For(Duration),
    /// Stop serving as soon as the terminal state is recorded
    Exit,
}

impl FromStr for LingerPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "forever" => Ok(LingerPolicy::Forever),
            "exit" | "0" => Ok(LingerPolicy::Exit),
            other => Ok(LingerPolicy::For(crate::server::parse_duration(other)?)),
        }
    }
}

/// Everything a manager run needs to know. Immutable once the coordinator
/// starts.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Namespace the bundle request lives in
    pub namespace: String,
    /// Name of the bundle request in the status store
    pub name: String,
    /// Number of distinct node bundles to wait for
    pub node_count: usize,
    /// How long to wait for node bundles after the cluster bundle is done
    pub wait_timeout: Duration,
    /// Directory holding the working directory and the final archive
    pub output_dir: PathBuf,
    pub issue_url: String,
    pub issue_description: String,
    /// Address the node receiver listens on
    pub listen: SocketAddr,
    /// Largest accepted node upload in bytes
    pub max_upload_bytes: usize,
    /// Namespaces whose pod logs are collected
    pub log_namespaces: Vec<String>,
    pub linger: LingerPolicy,
}

impl Default for BundleRequest {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            name: String::new(),
            node_count: 0,
            wait_timeout: constants::DEFAULT_WAIT_TIMEOUT,
            output_dir: PathBuf::new(),
            issue_url: String::new(),
            issue_description: String::new(),
            listen: SocketAddr::from(([0, 0, 0, 0], constants::DEFAULT_PORT)),
            max_upload_bytes: constants::DEFAULT_MAX_UPLOAD_BYTES,
            log_namespaces: Vec::new(),
            linger: LingerPolicy::Forever,
        }
    }
}

impl BundleRequest {
    pub fn builder() -> BundleRequestBuilder {
        BundleRequestBuilder::new()
    }

    /// Checks required fields, fills in defaults and creates the working
    /// directory. Nothing is published when this fails.
    pub fn validate(&mut self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(BundleError::Configuration(
                "namespace is not specified".to_string(),
            ));
        }
        if self.name.is_empty() {
            return Err(BundleError::Configuration(
                "support bundle name is not specified".to_string(),
            ));
        }
        if self.node_count == 0 {
            return Err(BundleError::Configuration(
                "node count is not specified".to_string(),
            ));
        }
        if self.wait_timeout > constants::MAX_WAIT_TIMEOUT {
            return Err(BundleError::Configuration(format!(
                "wait timeout {}s exceeds the maximum of {}s",
                self.wait_timeout.as_secs(),
                constants::MAX_WAIT_TIMEOUT.as_secs()
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            self.output_dir = std::env::temp_dir().join(constants::DEFAULT_OUTPUT_DIR_NAME);
        }
        if self.log_namespaces.is_empty() {
            self.log_namespaces = default_log_namespaces(&self.namespace);
        }

        let working_dir = self.working_dir();
        std::fs::create_dir_all(&working_dir).map_err(|e| {
            BundleError::Configuration(format!(
                "cannot create working directory {}: {}",
                working_dir.display(),
                e
            ))
        })?;
        Ok(())
    }

    pub fn working_dir(&self) -> PathBuf {
        constants::working_dir(&self.output_dir)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// The bundle's own namespace first, then the platform namespaces
pub fn default_log_namespaces(namespace: &str) -> Vec<String> {
    let mut namespaces = vec![namespace.to_string()];
    for ns in constants::DEFAULT_LOG_NAMESPACES {
        if *ns != namespace {
            namespaces.push(ns.to_string());
        }
    }
    namespaces
}

/// Builder for BundleRequest
pub struct BundleRequestBuilder {
    request: BundleRequest,
}

impl BundleRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: BundleRequest::default(),
        }
    }

    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.request.namespace = namespace.into();
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.request.name = name.into();
        self
    }

    pub fn node_count(mut self, count: usize) -> Self {
        self.request.node_count = count;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.request.wait_timeout = timeout;
        self
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.request.output_dir = dir.into();
        self
    }

    pub fn issue<S: Into<String>, D: Into<String>>(mut self, url: S, description: D) -> Self {
        self.request.issue_url = url.into();
        self.request.issue_description = description.into();
        self
    }

    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.request.listen = addr;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.request.max_upload_bytes = bytes;
        self
    }

    pub fn log_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.request.log_namespaces = namespaces;
        self
    }

    pub fn linger(mut self, policy: LingerPolicy) -> Self {
        self.request.linger = policy;
        self
    }

    pub fn build(self) -> BundleRequest {
        self.request
    }
}

impl Default for BundleRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
