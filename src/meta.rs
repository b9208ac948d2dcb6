// Bundle metadata written once into the working directory

use crate::constants;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Descriptive record of a bundle. Keys keep the names existing bundle
/// readers expect, including the historical `projectNamspaceUUID` spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    #[serde(rename = "projectName")]
    pub project_name: String,
    #[serde(rename = "projectVersion")]
    pub project_version: String,
    #[serde(rename = "kubernetesVersion")]
    pub kubernetes_version: String,
    #[serde(rename = "projectNamspaceUUID")]
    pub namespace_uid: String,
    #[serde(rename = "bundleCreatedAt")]
    pub created_at: String,
    #[serde(rename = "issueURL")]
    pub issue_url: String,
    #[serde(rename = "issueDescription")]
    pub issue_description: String,
}

impl BundleMeta {
    pub fn new(
        kubernetes_version: impl Into<String>,
        namespace_uid: impl Into<String>,
        issue_url: impl Into<String>,
        issue_description: impl Into<String>,
    ) -> Self {
        Self {
            project_name: constants::PROJECT_NAME.to_string(),
            project_version: constants::VERSION.to_string(),
            kubernetes_version: kubernetes_version.into(),
            namespace_uid: namespace_uid.into(),
            created_at: now(),
            issue_url: issue_url.into(),
            issue_description: issue_description.into(),
        }
    }

    /// Filename of the archive this bundle will be published as
    pub fn archive_filename(&self) -> String {
        constants::archive_filename(&self.namespace_uid, &self.created_at)
    }

    pub fn write_yaml(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_yaml::to_writer(file, self).context("Failed to encode bundle metadata")?;
        Ok(())
    }
}

/// Current UTC time, second precision
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
