//! Error types for the support bundle manager
//!
//! One variant per failure category of a bundle run:
//! - configuration and precondition failures abort before anything is published
//! - collection failures are recovered locally and land in the error log artifact
//! - generation fails only when the bundle metadata cannot be built
//! - ingestion failures are answered at the HTTP boundary
//! - timeout, assembly and status propagation failures end the run

use axum::http::StatusCode;
use thiserror::Error;

/// Top-level error type for a bundle run
#[derive(Error, Debug)]
pub enum BundleError {
    /// Required configuration is missing or invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The status store is not in the state the run requires
    #[error("invalid start state '{found}', expected '{expected}'")]
    Precondition { expected: String, found: String },

    /// A single data, log or external fetch failed
    #[error("failed to collect {item}: {reason}")]
    Collection { item: String, reason: String },

    /// The cluster bundle could not be generated at all
    #[error("fail to generate cluster bundle: {0}")]
    Generation(String),

    /// A node upload was rejected
    #[error("ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// Not every node reported before the deadline
    #[error("not all nodes reported: {reported}/{expected} node bundles received before timeout ({timeout_secs}s)")]
    Timeout {
        reported: usize,
        expected: usize,
        timeout_secs: u64,
    },

    /// The archive could not be produced
    #[error("fail to compress bundle: {0}")]
    Assembly(String),

    /// The outcome could not be recorded in the status store
    #[error("fail to record state '{state}': {reason}")]
    StatusPropagation { state: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    /// Whether the error ends the run. Collection failures are recovered
    /// locally and ingestion failures only reject the one upload.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BundleError::Collection { .. } | BundleError::Ingestion(_))
    }
}

/// Node upload errors
#[derive(Error, Debug)]
pub enum IngestionError {
    /// Node identifier is empty or would escape the nodes directory
    #[error("invalid node id '{0}'")]
    InvalidNodeId(String),

    /// The uploaded body is not a readable zip archive
    #[error("malformed bundle from node '{node}': {reason}")]
    CorruptArchive { node: String, reason: String },

    /// Writing the upload to disk failed
    #[error("fail to store bundle from node '{node}': {reason}")]
    Write { node: String, reason: String },
}

impl IngestionError {
    /// HTTP status the receiver answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestionError::InvalidNodeId(_) | IngestionError::CorruptArchive { .. } => {
                StatusCode::BAD_REQUEST
            }
            IngestionError::Write { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_status_codes() {
        assert_eq!(
            IngestionError::InvalidNodeId("a/b".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let corrupt = IngestionError::CorruptArchive {
            node: "a".into(),
            reason: "truncated".into(),
        };
        assert_eq!(corrupt.status_code(), StatusCode::BAD_REQUEST);
        let write = IngestionError::Write {
            node: "a".into(),
            reason: "disk full".into(),
        };
        assert_eq!(write.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_fatality() {
        let collection = BundleError::Collection {
            item: "pods".into(),
            reason: "forbidden".into(),
        };
        assert!(!collection.is_fatal());
        let ingestion = BundleError::from(IngestionError::InvalidNodeId("a/b".into()));
        assert!(!ingestion.is_fatal());
        assert!(BundleError::Configuration("no name".into()).is_fatal());
        assert!(BundleError::Assembly("boom".into()).is_fatal());
        assert!(BundleError::Generation("no uid".into()).is_fatal());
        let timeout = BundleError::Timeout {
            reported: 1,
            expected: 2,
            timeout_secs: 5,
        };
        assert!(timeout.is_fatal());
        assert!(timeout.to_string().contains("1/2"));
    }
}
