//! Build tracking handles and execution identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of one concrete run of a job.
///
/// Build numbers are positive and never reassigned, so the value is fixed
/// once observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// Returns `None` for zero, which no build system assigns.
    pub fn new(number: u64) -> Option<Self> {
        if number == 0 {
            None
        } else {
            Some(Self(number))
        }
    }

    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a handle was obtained, in decreasing order of confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleSource {
    /// Tracking location returned directly by the trigger response.
    TriggerResponse,

    /// First pending-queue entry whose task matches the configured job.
    QueueListing,

    /// The job's last known build number. May belong to someone else's run.
    LastKnownBuild,
}

impl HandleSource {
    pub fn confidence(&self) -> Confidence {
        match self {
            HandleSource::TriggerResponse | HandleSource::QueueListing => Confidence::High,
            HandleSource::LastKnownBuild => Confidence::Low,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandleSource::TriggerResponse => "trigger_response",
            HandleSource::QueueListing => "queue_listing",
            HandleSource::LastKnownBuild => "last_known_build",
        }
    }
}

/// Whether a handle is known to track the run we triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

/// Where the status of a triggered build can be queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingLocation {
    /// Absolute URL of a queue item (ends with `/`).
    QueueItem(String),

    /// A build that is already executing (or finished).
    Execution(ExecutionId),
}

/// Identifies a triggered unit of work until it starts executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildHandle {
    location: TrackingLocation,
    source: HandleSource,
}

impl BuildHandle {
    pub fn from_trigger_response(queue_url: impl Into<String>) -> Self {
        Self {
            location: TrackingLocation::QueueItem(queue_url.into()),
            source: HandleSource::TriggerResponse,
        }
    }

    pub fn from_queue_listing(queue_url: impl Into<String>) -> Self {
        Self {
            location: TrackingLocation::QueueItem(queue_url.into()),
            source: HandleSource::QueueListing,
        }
    }

    pub fn from_last_known_build(execution: ExecutionId) -> Self {
        Self {
            location: TrackingLocation::Execution(execution),
            source: HandleSource::LastKnownBuild,
        }
    }

    pub fn location(&self) -> &TrackingLocation {
        &self.location
    }

    pub fn source(&self) -> HandleSource {
        self.source
    }

    pub fn confidence(&self) -> Confidence {
        self.source.confidence()
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence() == Confidence::Low
    }
}

impl fmt::Display for BuildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            TrackingLocation::QueueItem(url) => write!(f, "queue item {url}")?,
            TrackingLocation::Execution(id) => write!(f, "build {id}")?,
        }
        write!(f, " (via {})", self.source.name())
    }
}
