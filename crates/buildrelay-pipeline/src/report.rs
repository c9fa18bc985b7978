//! Run outcome and per-stage report.

use buildrelay_browser::SubmissionReport;
use buildrelay_core::{CommitMarker, ExecutionId, Stage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::StageError;

/// Process exit code for a completed run or a no-op check.
pub const EXIT_SUCCESS: u8 = 0;

/// Process exit code for any stage failure.
pub const EXIT_FAILURE: u8 = 1;

/// Process exit code when a full run is requested without confirmation.
pub const EXIT_REFUSED: u8 = 2;

/// Process exit code after an operator interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// Timing of one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub duration_ms: u64,
    pub success: bool,
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing to do. `head` is `None` when the gate failed closed.
    UpToDate { head: Option<CommitMarker> },

    /// All stages passed and the marker now names `revision`.
    Completed {
        revision: CommitMarker,
        execution: ExecutionId,
        submission: SubmissionReport,
    },

    Failed {
        revision: CommitMarker,
        error: StageError,
    },

    /// Cancelled by the operator during `stage`; the marker is untouched.
    Interrupted { stage: Stage },
}

impl RunOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::UpToDate { .. } => "up_to_date",
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Interrupted { .. } => "interrupted",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::UpToDate { .. } | RunOutcome::Completed { .. } => EXIT_SUCCESS,
            RunOutcome::Failed { .. } => EXIT_FAILURE,
            RunOutcome::Interrupted { .. } => EXIT_INTERRUPTED,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == EXIT_SUCCESS
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Stages that ran, in order; the last one failed if the run failed.
    pub stages: Vec<StageRecord>,
    pub outcome: RunOutcome,
}

impl PipelineReport {
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.success).count()
    }

    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }

    /// Machine-readable summary for `--json` output.
    pub fn to_json(&self) -> serde_json::Value {
        let mut summary = json!({
            "run_id": self.run_id,
            "started_at": self.started_at.to_rfc3339(),
            "duration_ms": self.duration_ms,
            "status": self.outcome.status(),
            "stages": self.stages,
        });
        let details = match &self.outcome {
            RunOutcome::UpToDate { head } => json!({
                "head": head.as_ref().map(CommitMarker::as_str),
            }),
            RunOutcome::Completed {
                revision,
                execution,
                submission,
            } => json!({
                "revision": revision.as_str(),
                "build": execution.number(),
                "confirmed": submission.confirmed,
                "warnings": submission.warnings,
            }),
            RunOutcome::Failed { revision, error } => json!({
                "revision": revision.as_str(),
                "failed_stage": error.stage(),
                "error": error.to_string(),
                "log_tail": error.log_tail(),
            }),
            RunOutcome::Interrupted { stage } => json!({ "interrupted_stage": stage }),
        };
        if let (Some(summary), Some(details)) = (summary.as_object_mut(), details.as_object()) {
            summary.extend(details.clone());
        }
        summary
    }
}
