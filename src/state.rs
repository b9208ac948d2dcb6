// src/state.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a bundle request, as recorded in the status store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BundleState {
    /// Request exists but nobody picked it up yet
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "generating")]
    Generating,
    #[serde(rename = "managerdone")]
    ManagerDone,
    #[serde(rename = "agentdone")]
    AgentDone,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "ready")]
    Ready,
}

impl BundleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleState::None => "",
            BundleState::Generating => "generating",
            BundleState::ManagerDone => "managerdone",
            BundleState::AgentDone => "agentdone",
            BundleState::Error => "error",
            BundleState::Ready => "ready",
        }
    }

    /// Terminal for a manager run: nothing transitions out of these
    pub fn is_terminal(&self) -> bool {
        matches!(self, BundleState::AgentDone | BundleState::Error)
    }
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(BundleState::None),
            "generating" => Ok(BundleState::Generating),
            "managerdone" => Ok(BundleState::ManagerDone),
            "agentdone" => Ok(BundleState::AgentDone),
            "error" => Ok(BundleState::Error),
            "ready" => Ok(BundleState::Ready),
            other => anyhow::bail!("Unknown bundle state: {}", other),
        }
    }
}
