// External support bundle fetched over HTTP
//
// Speaks the Longhorn-compatible support bundle API: create a bundle, poll
// until it is ready for download, then save it into the destination.

use super::{ExternalBundleSource, IssueInfo};
use crate::constants;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const STATE_READY: &str = "ReadyForDownload";
const STATE_ERROR: &str = "Error";

#[derive(Debug, Serialize)]
struct InitiateInput<'a> {
    #[serde(rename = "issueURL")]
    issue_url: &'a str,
    description: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct SupportBundleResource {
    #[serde(rename = "podID", default)]
    pod_id: String,
    #[serde(rename = "nodeID", default)]
    node_id: String,
    #[serde(default)]
    state: String,
    name: String,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
    #[serde(rename = "progressPercentage", default)]
    progress: u32,
}

impl SupportBundleResource {
    fn backend_id(&self) -> &str {
        if self.pod_id.is_empty() {
            &self.node_id
        } else {
            &self.pod_id
        }
    }
}

pub struct RemoteBundleSource {
    name: String,
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl RemoteBundleSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::HTTP_TIMEOUT_SECS))
            .user_agent(constants::user_agent())
            .build()?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            poll_interval: constants::EXTERNAL_POLL_INTERVAL,
            poll_timeout: constants::EXTERNAL_POLL_TIMEOUT,
        })
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    async fn create(&self, issue: &IssueInfo) -> Result<SupportBundleResource> {
        let url = format!("{}/v1/supportbundles", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&InitiateInput {
                issue_url: &issue.url,
                description: &issue.description,
            })
            .send()
            .await
            .with_context(|| format!("Failed to create bundle at {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Unexpected status code: {} from {}", response.status(), url);
        }
        Ok(response.json().await?)
    }

    async fn get(&self, bundle: &SupportBundleResource) -> Result<SupportBundleResource> {
        let url = format!(
            "{}/v1/supportbundles/{}/{}",
            self.base_url,
            bundle.backend_id(),
            bundle.name
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Unexpected status code: {} from {}", response.status(), url);
        }
        Ok(response.json().await?)
    }

    async fn wait_ready(&self, bundle: &SupportBundleResource) -> Result<SupportBundleResource> {
        let deadline = tokio::time::Instant::now() + self.poll_timeout;
        loop {
            let current = self.get(bundle).await?;
            match current.state.as_str() {
                STATE_READY => return Ok(current),
                STATE_ERROR => anyhow::bail!(
                    "{} bundle {} failed: {}",
                    self.name,
                    current.name,
                    current.error_message
                ),
                _ => log::debug!(
                    "[External] {} bundle {} at {}%",
                    self.name,
                    current.name,
                    current.progress
                ),
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                anyhow::bail!("timeout for waiting a bundle from {}", self.name);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn download(&self, bundle: &SupportBundleResource, dest: &Path) -> Result<PathBuf> {
        let url = format!(
            "{}/v1/supportbundles/{}/{}/download",
            self.base_url,
            bundle.backend_id(),
            bundle.name
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Unexpected status code: {} from {}", response.status(), url);
        }

        let path = dest.join(format!("{}.{}", bundle.name, constants::ARCHIVE_EXTENSION));
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(path)
    }
}

#[async_trait]
impl ExternalBundleSource for RemoteBundleSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_into(&self, issue: &IssueInfo, dest: &Path) -> Result<()> {
        let created = self.create(issue).await?;
        log::info!(
            "[External] {} bundle {} is being generated...",
            self.name,
            created.name
        );
        let ready = self.wait_ready(&created).await?;
        let saved = self.download(&ready, dest).await?;
        log::info!("[External] {} bundle saved to {}", self.name, saved.display());
        Ok(())
    }
}
