// src/assembler.rs
//! Merges the working directory into the final zip archive.
//!
//! The archive is written to a temporary file in the output directory and
//! renamed into place only after the zip is finished, so the download
//! endpoint never sees a partial archive.

use crate::error::BundleError;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Files this large need zip64 headers
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// The finished artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

pub struct BundleAssembler {
    output_dir: PathBuf,
    working_dir: PathBuf,
}

impl BundleAssembler {
    pub fn new(output_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Compresses the whole working directory into `<output>/<archive_name>`.
    /// Entries are rooted at the working directory's base name.
    pub async fn assemble(&self, archive_name: &str) -> Result<Archive, BundleError> {
        let output_dir = self.output_dir.clone();
        let working_dir = self.working_dir.clone();
        let name = archive_name.to_string();

        log::info!(
            "[Assembler] Compressing {} into {}",
            working_dir.display(),
            name
        );

        tokio::task::spawn_blocking(move || build_archive(&output_dir, &working_dir, &name))
            .await
            .map_err(|e| BundleError::Assembly(format!("Task join error: {}", e)))?
            .map_err(|e| BundleError::Assembly(format!("{:#}", e)))
    }
}

fn build_archive(output_dir: &Path, working_dir: &Path, archive_name: &str) -> Result<Archive> {
    let root = working_dir
        .file_name()
        .and_then(|n| n.to_str())
        .context("Working directory has no usable base name")?
        .to_string();

    let final_path = output_dir.join(archive_name);
    let tmp = tempfile::Builder::new()
        .prefix(".assembling-")
        .suffix(".zip")
        .tempfile_in(output_dir)
        .context("Failed to create temporary archive")?;

    {
        let mut zip = ZipWriter::new(BufWriter::new(tmp.as_file()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        zip.add_directory(format!("{}/", root), options)?;
        let entries = add_tree(&mut zip, working_dir, &root, options)?;

        let mut writer = zip.finish().context("Failed to finish archive")?;
        writer.flush()?;
        log::debug!("[Assembler] Wrote {} entries", entries);
    }
    tmp.as_file().sync_all()?;

    tmp.persist(&final_path)
        .with_context(|| format!("Failed to move archive to {}", final_path.display()))?;

    let size = std::fs::metadata(&final_path)
        .context("Failed to get bundle file size")?
        .len();
    log::info!("[Assembler] Archive {} ready ({} bytes)", archive_name, size);

    Ok(Archive {
        name: archive_name.to_string(),
        path: final_path,
        size,
    })
}

fn add_tree<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<usize> {
    let mut children: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    children.sort_by_key(|entry| entry.file_name());

    let mut count = 0;
    for entry in children {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            log::warn!(
                "[Assembler] Skipping non UTF-8 path {}",
                entry.path().display()
            );
            continue;
        };
        let name = format!("{}/{}", prefix, file_name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            zip.add_directory(format!("{}/", name), options)?;
            count += 1 + add_tree(zip, &entry.path(), &name, options)?;
        } else if file_type.is_file() {
            let mut file = File::open(entry.path())
                .with_context(|| format!("Failed to open {}", entry.path().display()))?;
            let large = file.metadata()?.len() >= ZIP64_THRESHOLD;
            zip.start_file(name, options.large_file(large))?;
            std::io::copy(&mut file, zip)
                .with_context(|| format!("Failed to compress {}", entry.path().display()))?;
            count += 1;
        } else {
            log::debug!("[Assembler] Skipping special file {}", entry.path().display());
        }
    }
    Ok(count)
}
