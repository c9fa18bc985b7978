//! The fixed pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Compare the remote branch tip against the commit marker.
    Gate,

    /// Request the remote build and resolve a tracking handle.
    Trigger,

    /// Wait for the queued build to start executing.
    Queue,

    /// Wait for the executing build to finish.
    Build,

    /// Submit the downstream test execution through the web UI.
    UiAutomation,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Stage; 5] = [
        Stage::Gate,
        Stage::Trigger,
        Stage::Queue,
        Stage::Build,
        Stage::UiAutomation,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Gate => "gate",
            Stage::Trigger => "trigger",
            Stage::Queue => "queue",
            Stage::Build => "build",
            Stage::UiAutomation => "ui_automation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
