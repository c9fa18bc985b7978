//! buildrelay pipeline
//!
//! Runs the commit gate, build trigger, queue resolution, build watch and TEM
//! automation in order, and records the processed commit only after all of
//! them succeed.

pub mod error;
pub mod pipeline;
pub mod report;

pub use error::StageError;
pub use pipeline::{Dependencies, Pipeline};
pub use report::{
    PipelineReport, RunOutcome, StageRecord, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_REFUSED,
    EXIT_SUCCESS,
};
