// src/receiver.rs
//! Node bundle ingestion and archive publication.
//!
//! Uploads are streamed into a staging file outside the working directory,
//! checked for a readable central directory, and only then renamed to
//! `nodes/<node>.zip` and reported to the barrier. The rename replaces any
//! earlier bundle from the same node in one step, so the assembler never sees
//! a partial file. A rejected upload is kept as `nodes/<node>.zip.rejected`
//! for diagnostics.

use crate::assembler::Archive;
use crate::barrier::{CompletionBarrier, Completion};
use crate::constants;
use crate::error::IngestionError;
use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Result of an accepted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub node_id: String,
    pub bytes: u64,
    pub completion: Completion,
}

pub struct NodeBundleReceiver {
    working_dir: PathBuf,
    barrier: Arc<CompletionBarrier>,
    archive: RwLock<Option<Archive>>,
}

impl NodeBundleReceiver {
    pub fn new(working_dir: impl Into<PathBuf>, barrier: Arc<CompletionBarrier>) -> Self {
        Self {
            working_dir: working_dir.into(),
            barrier,
            archive: RwLock::new(None),
        }
    }

    pub fn barrier(&self) -> &Arc<CompletionBarrier> {
        &self.barrier
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Streams a node's bundle to disk, validates it, then signals the barrier.
    pub async fn ingest<S, E>(
        &self,
        node_id: &str,
        body: S,
    ) -> Result<IngestOutcome, IngestionError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        validate_node_id(node_id)?;
        log::debug!("[Receiver] Handle create node bundle for {}", node_id);

        let write_error = |reason: String| {
            log::error!("[Receiver] Failed to store bundle from {}: {}", node_id, reason);
            IngestionError::Write {
                node: node_id.to_string(),
                reason,
            }
        };

        let path = constants::node_bundle_path(&self.working_dir, node_id);
        let staging = constants::upload_staging_dir(&self.working_dir);
        let (staged, bytes) = write_stream(&staging, body).await.map_err(write_error)?;

        if let Err(reason) = verify_archive(staged.to_path_buf()).await {
            let rejected = path.with_extension(format!(
                "{}.{}",
                constants::ARCHIVE_EXTENSION,
                constants::REJECTED_SUFFIX
            ));
            log::error!(
                "[Receiver] Failed to verify bundle from {}: {} (kept as {})",
                node_id,
                reason,
                rejected.display()
            );
            if let Err(e) = place(staged, &rejected) {
                log::warn!("[Receiver] {}", e);
            }
            return Err(IngestionError::CorruptArchive {
                node: node_id.to_string(),
                reason,
            });
        }

        place(staged, &path).map_err(write_error)?;

        let completion = self.barrier.complete(node_id);
        log::info!(
            "[Receiver] Accepted bundle from node {} ({} bytes)",
            node_id,
            bytes
        );

        Ok(IngestOutcome {
            node_id: node_id.to_string(),
            bytes,
            completion,
        })
    }

    /// Makes the final archive downloadable. Only called once the run
    /// reached `AgentDone`.
    pub fn publish_archive(&self, archive: Archive) {
        *self.archive.write().unwrap() = Some(archive);
    }

    /// The downloadable archive, if the run produced one and it is still on disk
    pub fn archive(&self) -> Option<Archive> {
        self.archive
            .read()
            .unwrap()
            .as_ref()
            .filter(|archive| archive.path.is_file())
            .cloned()
    }
}

/// Node IDs become filenames, so anything that could leave the nodes
/// directory is refused.
pub fn validate_node_id(node_id: &str) -> Result<(), IngestionError> {
    let invalid = node_id.is_empty()
        || node_id == "."
        || node_id == ".."
        || node_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
    if invalid {
        return Err(IngestionError::InvalidNodeId(node_id.to_string()));
    }
    Ok(())
}

/// Streams the body into a fresh staging file. The file is removed when the
/// returned path is dropped without being placed.
async fn write_stream<S, E>(staging: &Path, mut body: S) -> Result<(TempPath, u64), String>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    tokio::fs::create_dir_all(staging)
        .await
        .map_err(|e| format!("fail to create directory {}: {}", staging.display(), e))?;

    let (file, staged) = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".part")
        .tempfile_in(staging)
        .map_err(|e| format!("fail to create file in {}: {}", staging.display(), e))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| format!("fail to read request body: {}", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| format!("fail to write {}: {}", staged.display(), e))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| format!("fail to flush {}: {}", staged.display(), e))?;

    Ok((staged, written))
}

/// Renames a staged upload to its final name, replacing any earlier file
fn place(staged: TempPath, dest: &Path) -> Result<(), String> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("fail to create directory {}: {}", parent.display(), e))?;
    }
    staged
        .persist(dest)
        .map_err(|e| format!("fail to move bundle to {}: {}", dest.display(), e))
}

/// Opens the zip and reads its central directory
async fn verify_archive(path: PathBuf) -> Result<(), String> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| e.to_string())?;
        zip::ZipArchive::new(file)
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
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

    fn body(data: Vec<u8>) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let chunks: Vec<Result<Bytes, std::io::Error>> = data
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    fn receiver(tmp: &TempDir, expected: usize) -> NodeBundleReceiver {
        NodeBundleReceiver::new(
            tmp.path().join("bundle"),
            Arc::new(CompletionBarrier::new(expected)),
        )
    }

    #[test]
    fn test_validate_node_id() {
        assert!(validate_node_id("node-1").is_ok());
        assert!(validate_node_id("harvester-abc.local").is_ok());
        for bad in ["", ".", "..", "a/b", "../etc", "a\\b", "a\0b"] {
            assert!(validate_node_id(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_ingest_valid_bundle() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 2);
        let data = zip_bytes(&[("node-a/journal.log", b"hello")]);
        let len = data.len() as u64;

        let outcome = receiver.ingest("a", body(data)).await.unwrap();
        assert_eq!(outcome.bytes, len);
        assert_eq!(outcome.completion, Completion::Counted { reported: 1 });
        assert!(tmp.path().join("bundle/nodes/a.zip").is_file());
    }

    #[tokio::test]
    async fn test_ingest_rejects_path_separator() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 1);
        let err = receiver
            .ingest("../escape", body(zip_bytes(&[("x", b"y")])))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestionError::InvalidNodeId(_)));
        assert_eq!(receiver.barrier().reported(), 0);
        assert!(!tmp.path().join("bundle/escape.zip").exists());
    }

    #[tokio::test]
    async fn test_ingest_rejects_corrupt_and_keeps_file() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 1);

        let mut truncated = zip_bytes(&[("x", b"some content")]);
        truncated.truncate(truncated.len() / 2);
        let err = receiver.ingest("a", body(truncated)).await.unwrap_err();
        assert!(matches!(err, IngestionError::CorruptArchive { .. }));

        let err = receiver.ingest("b", body(Vec::new())).await.unwrap_err();
        assert!(matches!(err, IngestionError::CorruptArchive { .. }));

        assert_eq!(receiver.barrier().reported(), 0);
        assert!(tmp.path().join("bundle/nodes/a.zip.rejected").is_file());
        assert!(tmp.path().join("bundle/nodes/b.zip.rejected").is_file());
        assert!(!tmp.path().join("bundle/nodes/a.zip").exists());
        assert!(!tmp.path().join("bundle/nodes/b.zip").exists());
    }

    fn staged_files(tmp: &TempDir) -> usize {
        std::fs::read_dir(tmp.path().join(".uploads"))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_failed_reupload_keeps_previous_bundle() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 2);
        let good = zip_bytes(&[("x", b"first")]);
        receiver.ingest("a", body(good.clone())).await.unwrap();

        let failing = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"PK")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let err = receiver.ingest("a", failing).await.unwrap_err();
        assert!(matches!(err, IngestionError::Write { .. }));

        let mut corrupt = zip_bytes(&[("x", b"second")]);
        corrupt.truncate(corrupt.len() / 2);
        let err = receiver.ingest("a", body(corrupt)).await.unwrap_err();
        assert!(matches!(err, IngestionError::CorruptArchive { .. }));

        let on_disk = std::fs::read(tmp.path().join("bundle/nodes/a.zip")).unwrap();
        assert_eq!(on_disk, good);
        assert_eq!(staged_files(&tmp), 0);
        assert_eq!(receiver.barrier().reported(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_for_one_node() {
        let tmp = TempDir::new().unwrap();
        let receiver = Arc::new(receiver(&tmp, 2));
        let first = zip_bytes(&[("x", &[b'1'; 4096])]);
        let second = zip_bytes(&[("x", &[b'2'; 8192])]);

        let uploads = [first.clone(), second.clone()].map(|data| {
            let receiver = Arc::clone(&receiver);
            tokio::spawn(async move { receiver.ingest("a", body(data)).await })
        });
        for upload in uploads {
            upload.await.unwrap().unwrap();
        }

        let on_disk = std::fs::read(tmp.path().join("bundle/nodes/a.zip")).unwrap();
        assert!(on_disk == first || on_disk == second);
        assert!(zip::ZipArchive::new(std::io::Cursor::new(on_disk)).is_ok());
        assert_eq!(receiver.barrier().reported(), 1);
        assert_eq!(staged_files(&tmp), 0);
    }

    #[tokio::test]
    async fn test_reupload_counts_once() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 2);
        let first = receiver
            .ingest("a", body(zip_bytes(&[("x", b"1")])))
            .await
            .unwrap();
        let second = receiver
            .ingest("a", body(zip_bytes(&[("x", b"2")])))
            .await
            .unwrap();
        assert_eq!(first.completion, Completion::Counted { reported: 1 });
        assert_eq!(second.completion, Completion::Duplicate);
        assert_eq!(receiver.barrier().reported(), 1);
    }

    #[tokio::test]
    async fn test_body_error_is_write_error() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 1);
        let failing = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"PK")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let err = receiver.ingest("a", failing).await.unwrap_err();
        assert!(matches!(err, IngestionError::Write { .. }));
        assert_eq!(receiver.barrier().reported(), 0);
    }

    #[test]
    fn test_archive_hidden_until_published() {
        let tmp = TempDir::new().unwrap();
        let receiver = receiver(&tmp, 1);
        assert!(receiver.archive().is_none());

        let path = tmp.path().join("final.zip");
        std::fs::write(&path, b"data").unwrap();
        receiver.publish_archive(Archive {
            name: "final.zip".to_string(),
            path: path.clone(),
            size: 4,
        });
        assert_eq!(receiver.archive().unwrap().size, 4);

        std::fs::remove_file(&path).unwrap();
        assert!(receiver.archive().is_none());
    }
}
