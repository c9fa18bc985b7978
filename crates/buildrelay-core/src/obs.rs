//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: start, stage transitions, finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::info;

use crate::domain::Stage;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("run-12345");
/// // Now all tracing calls are associated with run_id = "run-12345"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("buildrelay.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }

    /// A span to attach to an async block with `Instrument::instrument`.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("buildrelay.run", run_id = %run_id)
    }
}

/// Emit event: pipeline run started for a revision.
pub fn emit_pipeline_started(run_id: &str, revision: &str) {
    info!(event = "pipeline.started", run_id = %run_id, revision = %revision);
}

/// Emit event: a stage began.
pub fn emit_stage_started(run_id: &str, stage: Stage) {
    info!(event = "stage.started", run_id = %run_id, stage = %stage);
}

/// Emit event: a stage ended.
pub fn emit_stage_finished(run_id: &str, stage: Stage, duration_ms: u64, success: bool) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: pipeline run finished.
pub fn emit_pipeline_finished(run_id: &str, duration_ms: u64, status: &str) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        status = %status,
    );
}

/// Emit event: stage failure (warning level).
pub fn emit_stage_failed(run_id: &str, stage: Stage, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "stage.failed", run_id = %run_id, stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        // Just ensure RunSpan::enter doesn't panic
        let _span = RunSpan::enter("test-run-id");
    }

    #[test]
    fn test_emitters_do_not_panic() {
        emit_pipeline_started("run-1", "abc123");
        emit_stage_started("run-1", Stage::Trigger);
        emit_stage_finished("run-1", Stage::Trigger, 12, true);
        emit_stage_failed("run-1", Stage::Build, &"FAILURE");
        emit_pipeline_finished("run-1", 100, "completed");
    }
}
