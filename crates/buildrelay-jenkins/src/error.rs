//! Error types for the build-system stages.

use buildrelay_core::{ExecutionId, Interrupted};
use std::time::Duration;
use thiserror::Error;

/// Errors talking to the build system API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Non-success HTTP status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response body did not match the expected shape.
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A URL could not be built from configuration or a server response.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// The build could not be triggered, or triggered but not tracked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("build request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    /// Accepted, but no strategy produced a tracking handle.
    #[error("build was triggered but no tracking handle could be resolved")]
    NoHandle,
}

/// The queued build never started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("timed out after {}s waiting for the build to leave the queue", .waited.as_secs())]
    Timeout { waited: Duration },

    #[error("queue item was cancelled: {}", .why.as_deref().unwrap_or("no reason given"))]
    Cancelled { why: Option<String> },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// A build reached a terminal state other than success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("build {execution} failed with result {result}")]
pub struct BuildFailure {
    pub execution: ExecutionId,
    pub result: String,
    /// Last non-blank console lines, oldest first.
    pub log_tail: Vec<String>,
}
