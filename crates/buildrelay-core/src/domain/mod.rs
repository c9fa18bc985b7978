//! Domain models for buildrelay.
//!
//! Canonical definitions for the entities that flow through one pipeline run:
//! - `CommitMarker`: last revision fully processed (the only durable state)
//! - `BuildHandle`: tracking handle for a triggered, not yet executing build
//! - `ExecutionId`: number of a concrete running build
//! - `Outcome`: tri-state result of a polled operation
//! - `Stage`: the five ordered pipeline stages

pub mod error;
pub mod handle;
pub mod marker;
pub mod outcome;
pub mod stage;

// Re-export main types and errors
pub use error::{ConfigError, GateError, Interrupted, MarkerError, VcsError};
pub use handle::{BuildHandle, Confidence, ExecutionId, HandleSource, TrackingLocation};
pub use marker::CommitMarker;
pub use outcome::Outcome;
pub use stage::Stage;
