//! Stage failure taxonomy for a pipeline run.

use buildrelay_browser::UiError;
use buildrelay_core::{MarkerError, Stage};
use buildrelay_jenkins::{BuildFailure, QueueError, TriggerError};
use thiserror::Error;

/// Why a run stopped before advancing the commit marker.
///
/// Interruption is not a `StageError`; see [`crate::RunOutcome::Interrupted`].
#[derive(Error, Debug)]
pub enum StageError {
    #[error("build trigger failed: {0}")]
    Trigger(#[from] TriggerError),

    #[error("build never left the queue: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Build(#[from] BuildFailure),

    #[error("TEM automation failed: {0}")]
    Ui(#[from] UiError),

    /// Every stage passed but the new marker could not be written.
    #[error("could not record processed commit: {0}")]
    Marker(#[from] MarkerError),
}

impl StageError {
    /// The stage that failed; `None` for a marker write failure after all stages passed.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::Trigger(_) => Some(Stage::Trigger),
            StageError::Queue(_) => Some(Stage::Queue),
            StageError::Build(_) => Some(Stage::Build),
            StageError::Ui(_) => Some(Stage::UiAutomation),
            StageError::Marker(_) => None,
        }
    }

    /// Console tail attached to a build failure.
    pub fn log_tail(&self) -> &[String] {
        match self {
            StageError::Build(failure) => &failure.log_tail,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildrelay_core::ExecutionId;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(
            StageError::from(TriggerError::NoHandle).stage(),
            Some(Stage::Trigger)
        );
        let failure = BuildFailure {
            execution: ExecutionId::new(12).unwrap(),
            result: "FAILURE".to_string(),
            log_tail: vec!["BUILD FAILED".to_string()],
        };
        let err = StageError::from(failure);
        assert_eq!(err.stage(), Some(Stage::Build));
        assert_eq!(err.log_tail(), ["BUILD FAILED".to_string()]);
        assert_eq!(err.to_string(), "build #12 failed with result FAILURE");
    }
}
