// src/lib.rs
//! Support bundle manager.
//!
//! The manager collects a cluster-wide snapshot into a working directory,
//! waits for every node to push its own bundle over HTTP, merges everything
//! into one zip archive and records the outcome in a status store.

pub mod assembler;
pub mod barrier;
pub mod collect;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod meta;
pub mod receiver;
pub mod request;
pub mod runtime;
pub mod server;
pub mod sources;
pub mod state;
pub mod status;

pub use assembler::{Archive, BundleAssembler};
pub use barrier::{CompletionBarrier, WaitError};
pub use coordinator::{Collaborators, Coordinator, RunReport};
pub use error::{BundleError, IngestionError};
pub use meta::BundleMeta;
pub use receiver::{IngestOutcome, NodeBundleReceiver};
pub use request::{BundleRequest, LingerPolicy};
pub use state::BundleState;
pub use status::{FileStatusStore, MemoryStatusStore, StatusStore};
