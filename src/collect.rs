// src/collect.rs
//! Cluster bundle generation.
//!
//! Fills the working directory with everything the manager itself gathers:
//! `metadata.yaml`, `yamls/`, `logs/` and `external/`. Individual fetch
//! failures are appended to `bundleGenerationError.log` and never abort the
//! run. Only the namespace and version lookups that bundle metadata depends
//! on are fatal.

use crate::constants;
use crate::error::BundleError;
use crate::meta::BundleMeta;
use crate::sources::{ClusterDataSource, ExternalBundleSource, IssueInfo, LogSource};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Outcome of a successful generation
#[derive(Debug)]
pub struct GenerationReport {
    pub meta: BundleMeta,
    /// Every recovered collection failure, in the order it happened
    pub failures: Vec<BundleError>,
}

/// Append-only error log artifact
struct ErrorLog {
    writer: BufWriter<File>,
    failures: Vec<BundleError>,
}

impl ErrorLog {
    fn create(path: &Path) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            failures: Vec::new(),
        })
    }

    fn record(&mut self, item: impl Into<String>, err: &anyhow::Error) {
        let failure = BundleError::Collection {
            item: item.into(),
            reason: format!("{:#}", err),
        };
        log::warn!("[Collector] {}", failure);

        if let Err(e) = writeln!(self.writer, "{} {}", constants::ERROR_LOG_PREFIX, failure) {
            log::error!("[Collector] Failed to append to error log: {}", e);
        }
        self.failures.push(failure);
    }

    fn finish(mut self) -> Vec<BundleError> {
        if let Err(e) = self.writer.flush() {
            log::error!("[Collector] Failed to flush error log: {}", e);
        }
        self.failures
    }
}

pub struct ClusterBundleGenerator<'a> {
    working_dir: PathBuf,
    log_namespaces: &'a [String],
    issue: IssueInfo,
    data: &'a dyn ClusterDataSource,
    logs: &'a dyn LogSource,
    external: Option<&'a dyn ExternalBundleSource>,
}

impl<'a> ClusterBundleGenerator<'a> {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        data: &'a dyn ClusterDataSource,
        logs: &'a dyn LogSource,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            log_namespaces: &[],
            issue: IssueInfo::default(),
            data,
            logs,
            external: None,
        }
    }

    pub fn with_log_namespaces(mut self, namespaces: &'a [String]) -> Self {
        self.log_namespaces = namespaces;
        self
    }

    pub fn with_issue(mut self, issue: IssueInfo) -> Self {
        self.issue = issue;
        self
    }

    pub fn with_external(mut self, external: Option<&'a dyn ExternalBundleSource>) -> Self {
        self.external = external;
        self
    }

    pub async fn generate(&self) -> Result<GenerationReport, BundleError> {
        let namespace_uid = self
            .data
            .namespace_uid()
            .await
            .map_err(|e| BundleError::Generation(format!("{:#}", e)))?;
        let platform_version = self
            .data
            .platform_version()
            .await
            .map_err(|e| BundleError::Generation(format!("{:#}", e)))?;

        let meta = BundleMeta::new(
            platform_version,
            namespace_uid,
            self.issue.url.clone(),
            self.issue.description.clone(),
        );
        log::info!(
            "[Collector] Generating cluster bundle in {}",
            self.working_dir.display()
        );

        std::fs::create_dir_all(&self.working_dir)?;
        let mut errors = ErrorLog::create(&self.working_dir.join(constants::ERROR_LOG_FILE))
            .map_err(|e| BundleError::Generation(format!("{:#}", e)))?;

        let meta_path = self.working_dir.join(constants::METADATA_FILE);
        if let Err(e) = meta.write_yaml(&meta_path) {
            errors.record(constants::METADATA_FILE, &e);
        }

        self.collect_yamls(&mut errors).await;
        self.collect_logs(&mut errors).await;
        self.collect_external(&mut errors).await;

        let failures = errors.finish();
        log::info!(
            "[Collector] Cluster bundle generated ({} collection errors)",
            failures.len()
        );
        Ok(GenerationReport { meta, failures })
    }

    async fn collect_yamls(&self, errors: &mut ErrorLog) {
        let yamls_dir = self.working_dir.join(constants::YAMLS_DIR);
        for resource in self.data.resources() {
            let document = match self.data.fetch(&resource).await {
                Ok(document) => document,
                Err(e) => {
                    errors.record(resource.label(), &e);
                    serde_json::Value::Null
                }
            };

            let path = yamls_dir.join(resource.relative_path());
            if let Err(e) = write_yaml(&path, &document) {
                errors.record(path.display().to_string(), &e);
            }
        }
    }

    async fn collect_logs(&self, errors: &mut ErrorLog) {
        let logs_dir = self.working_dir.join(constants::LOGS_DIR);
        for namespace in self.log_namespaces {
            let pods = match self.logs.list_pods(namespace).await {
                Ok(pods) => pods,
                Err(e) => {
                    errors.record(format!("pod list in {}", namespace), &e);
                    continue;
                }
            };

            for pod in pods {
                let pod_dir = logs_dir.join(namespace).join(&pod.pod);
                for container in &pod.containers {
                    let path = pod_dir.join(format!("{}.log", container));
                    if let Err(e) = self
                        .stream_log(namespace, &pod.pod, container, &path)
                        .await
                    {
                        errors.record(path.display().to_string(), &e);
                    }
                }
            }
        }
    }

    async fn stream_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        path: &Path,
    ) -> Result<u64> {
        let mut stream = self
            .logs
            .open_log(namespace, pod, container)
            .await
            .with_context(|| format!("cannot get log for pod {} container {}", pod, container))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        let copied = tokio::io::copy(&mut stream, &mut file).await?;
        Ok(copied)
    }

    async fn collect_external(&self, errors: &mut ErrorLog) {
        let external_dir = self.working_dir.join(constants::EXTERNAL_DIR);
        if let Err(e) = tokio::fs::create_dir_all(&external_dir).await {
            errors.record("external bundle", &anyhow::Error::from(e));
            return;
        }

        let Some(external) = self.external else {
            return;
        };
        log::info!("[Collector] Fetching {} bundle", external.name());
        if let Err(e) = external.fetch_into(&self.issue, &external_dir).await {
            errors.record(format!("external bundle from {}", external.name()), &e);
        }
    }
}

fn write_yaml(path: &Path, document: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_yaml::to_writer(BufWriter::new(file), document)?;
    Ok(())
}
