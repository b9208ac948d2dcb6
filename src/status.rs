// src/status.rs
//! Status store: the durable record of a bundle request's lifecycle.
//!
//! `FileStatusStore` keeps one JSON document per bundle name in a directory
//! and replaces it atomically on every write. `MemoryStatusStore` is for
//! embedding and tests.

use crate::meta;
use crate::state::BundleState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get_state(&self, name: &str) -> Result<BundleState>;

    async fn set_state(&self, name: &str, state: BundleState) -> Result<()>;

    async fn set_error(&self, name: &str, state: BundleState, detail: &str) -> Result<()>;

    async fn set_done(
        &self,
        name: &str,
        state: BundleState,
        archive_name: &str,
        archive_size: u64,
    ) -> Result<()>;
}

/// Stored status of one bundle request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub state: BundleState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(default)]
    pub filesize: u64,
    #[serde(rename = "issueURL", default)]
    pub issue_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

impl StatusRecord {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            updated_at: meta::now(),
            ..Default::default()
        }
    }
}

// ============================================================================
// File-backed store
// ============================================================================

pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Creates or replaces the record for a new bundle request
    pub fn create(&self, record: &StatusRecord) -> Result<()> {
        self.write(record)
    }

    pub fn load(&self, name: &str) -> Result<StatusRecord> {
        let path = self.record_path(name);
        let data = std::fs::read(&path)
            .with_context(|| format!("Support bundle {} not found at {}", name, path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse status record {}", path.display()))
    }

    fn write(&self, record: &StatusRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(&record.name))
            .context("Failed to replace status record")?;
        Ok(())
    }

    fn update<F>(&self, name: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut StatusRecord),
    {
        let mut record = self.load(name)?;
        apply(&mut record);
        record.updated_at = meta::now();
        self.write(&record)
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn get_state(&self, name: &str) -> Result<BundleState> {
        Ok(self.load(name)?.state)
    }

    async fn set_state(&self, name: &str, state: BundleState) -> Result<()> {
        log::debug!("[Status] {} -> {} ({})", name, state, self.dir().display());
        self.update(name, |record| record.state = state)
    }

    async fn set_error(&self, name: &str, state: BundleState, detail: &str) -> Result<()> {
        log::debug!("[Status] {} -> {}: {}", name, state, detail);
        self.update(name, |record| {
            record.state = state;
            record.error = detail.to_string();
        })
    }

    async fn set_done(
        &self,
        name: &str,
        state: BundleState,
        archive_name: &str,
        archive_size: u64,
    ) -> Result<()> {
        log::debug!("[Status] {} -> {} ({}, {} bytes)", name, state, archive_name, archive_size);
        self.update(name, |record| {
            record.state = state;
            record.filename = archive_name.to_string();
            record.filesize = archive_size;
        })
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<String, StatusRecord>>,
    history: RwLock<Vec<(String, BundleState)>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one request already in the given state
    pub fn with_request(name: &str, state: BundleState) -> Self {
        let store = Self::new();
        let mut record = StatusRecord::new(name, "");
        record.state = state;
        store.records.write().unwrap().insert(name.to_string(), record);
        store
    }

    pub fn record(&self, name: &str) -> Option<StatusRecord> {
        self.records.read().unwrap().get(name).cloned()
    }

    /// Every state written, in order
    pub fn history(&self) -> Vec<BundleState> {
        self.history
            .read()
            .unwrap()
            .iter()
            .map(|(_, state)| *state)
            .collect()
    }

    fn update<F>(&self, name: &str, state: BundleState, apply: F) -> Result<()>
    where
        F: FnOnce(&mut StatusRecord),
    {
        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(name)
            .with_context(|| format!("Support bundle {} not found", name))?;
        record.state = state;
        record.updated_at = meta::now();
        apply(record);
        self.history.write().unwrap().push((name.to_string(), state));
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get_state(&self, name: &str) -> Result<BundleState> {
        self.records
            .read()
            .unwrap()
            .get(name)
            .map(|record| record.state)
            .with_context(|| format!("Support bundle {} not found", name))
    }

    async fn set_state(&self, name: &str, state: BundleState) -> Result<()> {
        self.update(name, state, |_| {})
    }

    async fn set_error(&self, name: &str, state: BundleState, detail: &str) -> Result<()> {
        self.update(name, state, |record| record.error = detail.to_string())
    }

    async fn set_done(
        &self,
        name: &str,
        state: BundleState,
        archive_name: &str,
        archive_size: u64,
    ) -> Result<()> {
        self.update(name, state, |record| {
            record.filename = archive_name.to_string();
            record.filesize = archive_size;
        })
    }
}
