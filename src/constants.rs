//! Global constants and helpers for working-directory layout, archive naming, and networking defaults
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Binary name used in user agents and bundle metadata
pub const BINARY_NAME: &str = "supportbundle";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string for HTTP requests
pub fn user_agent() -> String {
    format!("{}/{}", BINARY_NAME, VERSION)
}

// ============================================================================
// Working Directory Layout
// ============================================================================

/// Name of the staging directory inside the output directory. Also the
/// top-level entry of the final archive.
pub const WORKING_DIR_NAME: &str = "bundle";

/// Bundle metadata file, relative to the working directory
pub const METADATA_FILE: &str = "metadata.yaml";

/// Collection error log, relative to the working directory
pub const ERROR_LOG_FILE: &str = "bundleGenerationError.log";

/// Resource manifests subtree
pub const YAMLS_DIR: &str = "yamls";

/// Pod log subtree
pub const LOGS_DIR: &str = "logs";

/// External sub-bundle subtree
pub const EXTERNAL_DIR: &str = "external";

/// Node bundle subtree (written only by the receiver)
pub const NODES_DIR: &str = "nodes";

/// Extension used for stored node bundles and the final archive
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Returns the working directory for an output directory
pub fn working_dir(output_dir: impl AsRef<Path>) -> PathBuf {
    output_dir.as_ref().join(WORKING_DIR_NAME)
}

/// Returns the directory that receives node bundles
pub fn nodes_dir(working_dir: impl AsRef<Path>) -> PathBuf {
    working_dir.as_ref().join(NODES_DIR)
}

/// Staging area for uploads in flight, next to the working directory so it
/// is never part of the archive
pub const UPLOAD_STAGING_DIR: &str = ".uploads";

/// Suffix appended to node bundles that failed validation
pub const REJECTED_SUFFIX: &str = "rejected";

/// Returns the staging directory for a working directory
pub fn upload_staging_dir(working_dir: impl AsRef<Path>) -> PathBuf {
    let working_dir = working_dir.as_ref();
    match working_dir.parent() {
        Some(parent) => parent.join(UPLOAD_STAGING_DIR),
        None => working_dir.join(UPLOAD_STAGING_DIR),
    }
}

/// Returns the on-disk path of a node's bundle
pub fn node_bundle_path(working_dir: impl AsRef<Path>, node_id: &str) -> PathBuf {
    nodes_dir(working_dir).join(format!("{}.{}", node_id, ARCHIVE_EXTENSION))
}

/// Returns the archive filename for a namespace UID and creation timestamp.
///
/// Colons are not portable in filenames, so they are replaced with dashes.
pub fn archive_filename(namespace_uid: &str, created_at: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        BINARY_NAME,
        namespace_uid,
        created_at.replace(':', "-"),
        ARCHIVE_EXTENSION
    )
}

// ============================================================================
// Collection Defaults
// ============================================================================

/// Project name recorded in bundle metadata
pub const PROJECT_NAME: &str = "Harvester";

/// Namespaces whose pod logs are always collected, in addition to the
/// bundle's own namespace
pub const DEFAULT_LOG_NAMESPACES: &[&str] = &["default", "kube-system", "cattle-system"];

/// Prefix of every line written to the collection error log
pub const ERROR_LOG_PREFIX: &str = "Support Bundle:";

// ============================================================================
// Manager Defaults
// ============================================================================

/// Default time to wait for node bundles
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Longest accepted wait for node bundles
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default output directory name under the system temp dir
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "support-bundle";

/// Default HTTP listen host
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default maximum accepted node upload (2 GiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Default external bundle API (Longhorn backend service)
pub const DEFAULT_EXTERNAL_API_URL: &str = "http://longhorn-backend.longhorn-system:9500";

// ============================================================================
// External Bundle Source
// ============================================================================

/// Poll interval while waiting for an external bundle
pub const EXTERNAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Give up on an external bundle after this long
pub const EXTERNAL_POLL_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// HTTP request timeout for external bundle API calls
pub const HTTP_TIMEOUT_SECS: u64 = 60;
