#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use supportbundle::coordinator::RunReport;
use supportbundle::sources::{ClusterDataSource, LogSource, PodContainers, ResourceDescriptor};
use supportbundle::{
    BundleRequest, BundleState, Collaborators, Coordinator, LingerPolicy, MemoryStatusStore,
};

pub const NAMESPACE: &str = "harvester-system";
pub const BUNDLE_NAME: &str = "sb-test";

pub fn setup_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(anyhow::Error::from)
}

/// A small valid zip, as a node would upload it
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn node_bundle(node: &str) -> Vec<u8> {
    zip_bytes(&[(
        &format!("{}/journal.log", node),
        format!("boot ok on {}\n", node).as_bytes(),
    )])
}

/// Scripted cluster: two resource kinds and one pod per namespace
#[derive(Default)]
pub struct FakeCluster {
    pub failing_kinds: HashSet<String>,
    pub missing_namespace: bool,
}

impl FakeCluster {
    pub fn failing(kind: &str) -> Self {
        Self {
            failing_kinds: HashSet::from([kind.to_string()]),
            missing_namespace: false,
        }
    }
}

#[async_trait]
impl ClusterDataSource for FakeCluster {
    async fn namespace_uid(&self) -> Result<String> {
        if self.missing_namespace {
            anyhow::bail!("namespaces \"{}\" not found", NAMESPACE);
        }
        Ok("0e3b6e8c-uid".to_string())
    }

    async fn platform_version(&self) -> Result<String> {
        Ok("v1.21.3+rke2r1".to_string())
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        vec![
            ResourceDescriptor::new("kubernetes", "pods").in_namespace(NAMESPACE),
            ResourceDescriptor::new("kubernetes", "nodes"),
        ]
    }

    async fn fetch(&self, resource: &ResourceDescriptor) -> Result<serde_json::Value> {
        if self.failing_kinds.contains(&resource.kind) {
            anyhow::bail!("{} is forbidden: access denied", resource.kind);
        }
        Ok(json!({"kind": "List", "items": [{"metadata": {"name": format!("{}-0", resource.kind)}}]}))
    }
}

#[async_trait]
impl LogSource for FakeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodContainers>> {
        Ok(vec![PodContainers {
            pod: format!("{}-pod", namespace),
            containers: vec!["main".to_string()],
        }])
    }

    async fn open_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let text = format!("2021-05-01T00:00:00Z {}/{}/{} started\n", namespace, pod, container);
        Ok(Box::new(std::io::Cursor::new(text.into_bytes())))
    }
}

pub fn collaborators(cluster: FakeCluster, store: &Arc<MemoryStatusStore>) -> Collaborators {
    let cluster = Arc::new(cluster);
    Collaborators::new(cluster.clone(), cluster, store.clone())
}

pub fn request(output_dir: &Path, node_count: usize, wait: Duration) -> BundleRequest {
    BundleRequest::builder()
        .namespace(NAMESPACE)
        .name(BUNDLE_NAME)
        .node_count(node_count)
        .wait_timeout(wait)
        .output_dir(output_dir)
        .issue("https://example.com/issues/1", "vm stuck")
        .listen("127.0.0.1:0".parse().unwrap())
        .linger(LingerPolicy::Exit)
        .build()
}

pub fn store() -> Arc<MemoryStatusStore> {
    Arc::new(MemoryStatusStore::with_request(
        BUNDLE_NAME,
        BundleState::Generating,
    ))
}

pub type RunHandle = JoinHandle<supportbundle::error::Result<RunReport>>;

/// Spawns a coordinator run; the receiver yields the listener address once
/// uploads are accepted
pub fn spawn_coordinator(
    request: BundleRequest,
    collaborators: Collaborators,
) -> (oneshot::Receiver<SocketAddr>, RunHandle) {
    let (tx, rx) = oneshot::channel();
    let coordinator = Coordinator::new(request, collaborators).with_addr_notifier(tx);
    let handle = tokio::spawn(coordinator.run());
    (rx, handle)
}

pub async fn upload(
    client: &reqwest::Client,
    addr: SocketAddr,
    node: &str,
    body: Vec<u8>,
) -> Result<reqwest::Response> {
    Ok(client
        .post(format!("http://{}/bundle/nodes/{}", addr, node))
        .body(body)
        .send()
        .await?)
}

pub async fn download(client: &reqwest::Client, addr: SocketAddr) -> Result<reqwest::Response> {
    Ok(client
        .get(format!("http://{}/bundle/download", addr))
        .send()
        .await?)
}

pub fn archive_entries(data: &[u8]) -> Result<Vec<String>> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(data))?;
    Ok(archive.file_names().map(str::to_string).collect())
}
