// Cluster data and pod logs through the kubectl binary

use super::{ClusterDataSource, LogSource, PodContainers, ResourceDescriptor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Namespaced,
    Cluster,
}

use Scope::{Cluster, Namespaced};

/// (kind, api resource, scope)
type KindEntry = (&'static str, &'static str, Scope);

const KUBERNETES_KINDS: &[KindEntry] = &[
    ("events", "events", Namespaced),
    ("pods", "pods", Namespaced),
    ("services", "services", Namespaced),
    ("deployments", "deployments.apps", Namespaced),
    ("daemonsets", "daemonsets.apps", Namespaced),
    ("statefulsets", "statefulsets.apps", Namespaced),
    ("jobs", "jobs.batch", Namespaced),
    ("cronjobs", "cronjobs.batch", Namespaced),
    ("nodes", "nodes", Cluster),
    ("configmaps", "configmaps", Namespaced),
    ("volumeattachments", "volumeattachments.storage.k8s.io", Cluster),
];

const HARVESTER_KINDS: &[KindEntry] = &[
    ("keypairs", "keypairs.harvester.cattle.io", Namespaced),
    ("preferences", "preferences.harvester.cattle.io", Namespaced),
    ("settings", "settings.harvester.cattle.io", Cluster),
    ("upgrades", "upgrades.harvester.cattle.io", Namespaced),
    ("users", "users.harvester.cattle.io", Cluster),
    ("virtualmachinebackups", "virtualmachinebackups.harvester.cattle.io", Namespaced),
    (
        "virtualmachinebackupcontents",
        "virtualmachinebackupcontents.harvester.cattle.io",
        Namespaced,
    ),
    ("virtualmachineimages", "virtualmachineimages.harvester.cattle.io", Namespaced),
    ("virtualmachinerestores", "virtualmachinerestores.harvester.cattle.io", Namespaced),
    ("virtualmachinetemplates", "virtualmachinetemplates.harvester.cattle.io", Namespaced),
    (
        "virtualmachinetemplateversions",
        "virtualmachinetemplateversions.harvester.cattle.io",
        Namespaced,
    ),
];

const KUBEVIRT_KINDS: &[KindEntry] = &[
    ("virtualmachines", "virtualmachines.kubevirt.io", Namespaced),
    ("virtualmachineinstances", "virtualmachineinstances.kubevirt.io", Namespaced),
    (
        "virtualmachineinstancemigrations",
        "virtualmachineinstancemigrations.kubevirt.io",
        Namespaced,
    ),
];

const CDI_KINDS: &[KindEntry] = &[("datavolumes", "datavolumes.cdi.kubevirt.io", Namespaced)];

/// Namespace that holds VMs and their images
const WORKLOAD_NAMESPACE: &str = "default";

fn api_resource(kind: &str) -> Option<&'static str> {
    [KUBERNETES_KINDS, HARVESTER_KINDS, KUBEVIRT_KINDS, CDI_KINDS]
        .iter()
        .flat_map(|table| table.iter())
        .find(|(k, _, _)| *k == kind)
        .map(|(_, api, _)| *api)
}

fn descriptors(group: &str, table: &[KindEntry], namespace: &str) -> Vec<ResourceDescriptor> {
    table
        .iter()
        .map(|(kind, _, scope)| {
            let descriptor = ResourceDescriptor::new(group, *kind);
            match scope {
                Namespaced => descriptor.in_namespace(namespace),
                Cluster => descriptor,
            }
        })
        .collect()
}

pub struct KubectlSource {
    kubectl: PathBuf,
    namespace: String,
}

impl KubectlSource {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            kubectl: PathBuf::from("kubectl"),
            namespace: namespace.into(),
        }
    }

    pub fn with_binary(mut self, kubectl: impl Into<PathBuf>) -> Self {
        self.kubectl = kubectl.into();
        self
    }

    /// Runs kubectl to completion and returns its stdout; a non-zero exit is
    /// an error carrying stderr
    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        log::debug!("[Kubectl] {} {}", self.kubectl.display(), args.join(" "));
        let output = Command::new(&self.kubectl)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.kubectl.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "kubectl {} failed ({}): {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let stdout = self.run(args).await?;
        serde_json::from_slice(&stdout).context("Failed to parse kubectl output")
    }
}

#[async_trait]
impl ClusterDataSource for KubectlSource {
    async fn namespace_uid(&self) -> Result<String> {
        let ns = self
            .run_json(&["get", "namespace", &self.namespace, "-o", "json"])
            .await
            .context("cannot get namespace")?;
        parse_namespace_uid(&ns)
    }

    async fn platform_version(&self) -> Result<String> {
        let version = self
            .run_json(&["version", "-o", "json"])
            .await
            .context("cannot get kubernetes version")?;
        parse_server_version(&version)
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        let mut resources = descriptors("kubernetes", KUBERNETES_KINDS, &self.namespace);

        let mut harvester_namespaces = vec![self.namespace.as_str()];
        if self.namespace != WORKLOAD_NAMESPACE {
            harvester_namespaces.push(WORKLOAD_NAMESPACE);
        }
        for ns in harvester_namespaces {
            resources.extend(descriptors(
                &format!("harvester/harvester/{}", ns),
                HARVESTER_KINDS,
                ns,
            ));
        }

        resources.extend(descriptors(
            &format!("harvester/kubevirt/{}", WORKLOAD_NAMESPACE),
            KUBEVIRT_KINDS,
            WORKLOAD_NAMESPACE,
        ));
        resources.extend(descriptors(
            &format!("harvester/cdi/{}", WORKLOAD_NAMESPACE),
            CDI_KINDS,
            WORKLOAD_NAMESPACE,
        ));
        resources
    }

    async fn fetch(&self, resource: &ResourceDescriptor) -> Result<Value> {
        let api = api_resource(&resource.kind)
            .with_context(|| format!("unknown resource kind {}", resource.kind))?;
        let mut args = vec!["get", api, "-o", "json"];
        if let Some(ns) = resource.namespace.as_deref() {
            args.extend(["-n", ns]);
        }
        self.run_json(&args).await
    }
}

#[async_trait]
impl LogSource for KubectlSource {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodContainers>> {
        let list = self
            .run_json(&["get", "pods", "-n", namespace, "-o", "json"])
            .await
            .context("cannot get pod list")?;
        parse_pod_list(&list)
    }

    async fn open_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let log = self
            .run(&["logs", "-n", namespace, pod, "-c", container, "--timestamps"])
            .await?;
        Ok(Box::new(std::io::Cursor::new(log)))
    }
}

fn parse_namespace_uid(ns: &Value) -> Result<String> {
    ns.pointer("/metadata/uid")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("namespace has no uid")
}

fn parse_server_version(version: &Value) -> Result<String> {
    version
        .pointer("/serverVersion/gitVersion")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("server version missing from kubectl output")
}

fn parse_pod_list(list: &Value) -> Result<Vec<PodContainers>> {
    let items = list
        .get("items")
        .and_then(Value::as_array)
        .context("BUG: didn't get pod list")?;

    Ok(items
        .iter()
        .filter_map(|pod| {
            let name = pod.pointer("/metadata/name")?.as_str()?.to_string();
            let containers = pod
                .pointer("/spec/containers")
                .and_then(Value::as_array)
                .map(|cs| {
                    cs.iter()
                        .filter_map(|c| c.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(PodContainers {
                pod: name,
                containers,
            })
        })
        .collect())
}
