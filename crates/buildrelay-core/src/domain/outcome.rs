//! Tri-state result of a polled operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one poll, or of a whole polling loop once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Keep polling.
    Pending,

    Succeeded,

    /// Terminal failure with the reason reported by the remote system
    /// (e.g. `FAILURE`, `ABORTED`) or `timeout`.
    Failed(String),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    /// The failure reason, if this is a failure.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Outcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => f.write_str("pending"),
            Outcome::Succeeded => f.write_str("succeeded"),
            Outcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}
