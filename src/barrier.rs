//! Completion barrier for node bundles.
//!
//! Counts distinct node completions and releases a single waiter once the
//! expected count is reached. The node set, the released flag and the
//! expiry flag share one mutex, so a completion and the release decision it
//! triggers are a single step.
//!
//! The barrier is single-use: the first `wait` to return consumes it, and
//! any later `wait` returns `WaitError::AlreadyConsumed` without blocking.
//!
//! Release against deadline: when the deadline fires the waiter re-takes the
//! lock and checks the released flag once more. A release recorded before
//! that check wins, even if the timer fired first. Completions arriving
//! after the waiter gave up are not recorded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Why `wait` returned without success
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out with {reported}/{expected} nodes reported")]
    TimedOut { reported: usize, expected: usize },

    #[error("barrier already consumed by another waiter")]
    AlreadyConsumed,
}

/// What a `complete` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// First completion for this node; `reported` is the new distinct count
    Counted { reported: usize },
    /// Node already recorded
    Duplicate,
    /// Waiter already gave up; nothing recorded
    Late,
}

#[derive(Debug, Default)]
struct BarrierInner {
    nodes: BTreeMap<String, DateTime<Utc>>,
    released: bool,
    consumed: bool,
    expired: bool,
}

pub struct CompletionBarrier {
    expected: usize,
    inner: Mutex<BarrierInner>,
    notify: Notify,
}

/// Point-in-time view of the barrier, served on the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BarrierSnapshot {
    pub expected: usize,
    pub reported: usize,
    pub nodes: Vec<String>,
    pub released: bool,
    pub expired: bool,
}

impl CompletionBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            inner: Mutex::new(BarrierInner::default()),
            notify: Notify::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Records that `node_id` finished. Idempotent per node.
    pub fn complete(&self, node_id: &str) -> Completion {
        let mut inner = self.inner.lock().unwrap();

        if inner.expired {
            log::warn!(
                "[Barrier] Late completion from node {} ignored, wait already timed out",
                node_id
            );
            return Completion::Late;
        }
        if inner.nodes.contains_key(node_id) {
            log::debug!("[Barrier] Node {} already completed", node_id);
            return Completion::Duplicate;
        }

        inner.nodes.insert(node_id.to_string(), Utc::now());
        let reported = inner.nodes.len();
        log::debug!(
            "[Barrier] Complete node {} ({}/{})",
            node_id,
            reported,
            self.expected
        );

        if reported >= self.expected && !inner.released {
            inner.released = true;
            log::debug!("[Barrier] All {} node bundles received", self.expected);
            // Stores a permit when nobody is waiting yet
            self.notify.notify_one();
        }

        Completion::Counted { reported }
    }

    /// Blocks until every expected node completed or `deadline` passes.
    /// Returns the number of distinct nodes reported.
    pub async fn wait(&self, deadline: Instant) -> Result<usize, WaitError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.consumed {
                return Err(WaitError::AlreadyConsumed);
            }
            if inner.released {
                inner.consumed = true;
                return Ok(inner.nodes.len());
            }
        }

        let timed_out = tokio::time::timeout_at(deadline, self.notify.notified())
            .await
            .is_err();

        let mut inner = self.inner.lock().unwrap();
        if inner.consumed {
            return Err(WaitError::AlreadyConsumed);
        }
        inner.consumed = true;

        if inner.released {
            if timed_out {
                log::debug!("[Barrier] Deadline fired after release, release wins");
            }
            return Ok(inner.nodes.len());
        }

        inner.expired = true;
        Err(WaitError::TimedOut {
            reported: inner.nodes.len(),
            expected: self.expected,
        })
    }

    pub fn reported(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().unwrap().released
    }

    pub fn snapshot(&self) -> BarrierSnapshot {
        let inner = self.inner.lock().unwrap();
        BarrierSnapshot {
            expected: self.expected,
            reported: inner.nodes.len(),
            nodes: inner.nodes.keys().cloned().collect(),
            released: inner.released,
            expired: inner.expired,
        }
    }
}
