//! Collaborators that feed the cluster bundle.
//!
//! The coordinator only talks to these traits. Two implementations ship with
//! the crate:
//!
//! - `KubectlSource`: cluster data and pod logs through the `kubectl` binary
//! - `RemoteBundleSource`: an external support bundle over HTTP
//!
//! Tests provide scripted fakes.

pub mod kubectl;
pub mod remote;

pub use kubectl::KubectlSource;
pub use remote::RemoteBundleSource;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

/// One fetchable collection of cluster objects, e.g. `kubernetes/pods`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Directory under `yamls/` the collection is written to
    pub group: PathBuf,
    /// Collection name; becomes `<kind>.yaml`
    pub kind: String,
    /// Namespace to list in, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(group: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Path of the manifest file relative to `yamls/`
    pub fn relative_path(&self) -> PathBuf {
        self.group.join(format!("{}.yaml", self.kind))
    }

    pub fn label(&self) -> String {
        self.relative_path().display().to_string()
    }
}

/// A pod and the containers whose logs are collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodContainers {
    pub pod: String,
    pub containers: Vec<String>,
}

/// Issue metadata handed to an external bundle source
#[derive(Debug, Clone, Default)]
pub struct IssueInfo {
    pub url: String,
    pub description: String,
}

/// Supplies cluster objects by collection
#[async_trait]
pub trait ClusterDataSource: Send + Sync {
    /// UID of the bundle's namespace; required for bundle metadata
    async fn namespace_uid(&self) -> Result<String>;

    /// Version of the platform's API server; required for bundle metadata
    async fn platform_version(&self) -> Result<String>;

    /// Every collection this source can fetch
    fn resources(&self) -> Vec<ResourceDescriptor>;

    /// Fetches one collection as a serializable document
    async fn fetch(&self, resource: &ResourceDescriptor) -> Result<serde_json::Value>;
}

/// Supplies pod log streams
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodContainers>>;

    async fn open_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Supplies a third-party sub-bundle
#[async_trait]
pub trait ExternalBundleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Populates `dest` with the sub-bundle
    async fn fetch_into(&self, issue: &IssueInfo, dest: &Path) -> Result<()>;
}
