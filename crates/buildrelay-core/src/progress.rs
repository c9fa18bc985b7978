//! Progress notifications emitted by the polling stages.
//!
//! Stages report what they observe through a [`PipelineObserver`]; the
//! observer decides how to render it. Observers must not block: they run on
//! the polling task between polls.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::{ExecutionId, Outcome, Stage};
use crate::facts::FactSource;

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted(Stage),

    StageFinished { stage: Stage, ok: bool },

    /// A blocking wait began; cosmetic indicators may start here.
    WaitStarted { label: String },

    /// The wait that began with the last `WaitStarted` is over.
    WaitFinished,

    /// The build is still queued. `minutes` is time since the server enqueued it.
    StillQueued { minutes: u64, why: Option<String> },

    ExecutionStarted {
        execution: ExecutionId,
        queued_for: Duration,
    },

    StillBuilding {
        execution: ExecutionId,
        elapsed: Duration,
    },

    BuildFinished {
        execution: ExecutionId,
        outcome: Outcome,
    },

    /// Last non-blank console lines of a failed build.
    LogTail {
        execution: ExecutionId,
        lines: Vec<String>,
    },
}

impl ProgressEvent {
    /// Long-wait notifications get the operator reminders attached.
    pub fn is_long_wait_notice(&self) -> bool {
        matches!(
            self,
            ProgressEvent::StillQueued { .. }
                | ProgressEvent::StillBuilding { .. }
                | ProgressEvent::ExecutionStarted { .. }
        )
    }
}

/// Receives progress events from the pipeline.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl PipelineObserver for NullObserver {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Format a duration as `Xm Ys`.
pub fn format_minutes_seconds(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m {}s", secs / 60, secs % 60)
}

/// Renders progress events as tracing log lines.
#[derive(Clone, Default)]
pub struct TracingObserver {
    facts: Option<Arc<dyn FactSource>>,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fun fact to every long-wait notice.
    pub fn with_facts(mut self, facts: Arc<dyn FactSource>) -> Self {
        self.facts = Some(facts);
        self
    }

    fn remind(&self) {
        info!("Please don't close this terminal while waiting.");
        info!("Stay connected to the VPN to avoid failures.");
        if let Some(facts) = &self.facts {
            // Fetched off the polling task so a slow API never delays a poll.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let facts = Arc::clone(facts);
                handle.spawn(async move {
                    let fact = facts.fact().await;
                    info!("DYK? {fact}");
                });
            }
        }
    }
}

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted(stage) => info!(stage = %stage, "Stage started"),
            ProgressEvent::StageFinished { stage, ok } => {
                info!(stage = %stage, ok = ok, "Stage finished")
            }
            ProgressEvent::WaitStarted { label } => info!("{label}"),
            ProgressEvent::WaitFinished => {}
            ProgressEvent::StillQueued { minutes, why } => info!(
                "Still in queue (~{minutes} min) {}",
                why.as_deref().unwrap_or("Waiting for available executor")
            ),
            ProgressEvent::ExecutionStarted {
                execution,
                queued_for,
            } => info!(
                "Build started: {execution} (waited {} in queue)",
                format_minutes_seconds(*queued_for)
            ),
            ProgressEvent::StillBuilding { execution, elapsed } => info!(
                "Build {execution} still running ({} elapsed)",
                format_minutes_seconds(*elapsed)
            ),
            ProgressEvent::BuildFinished { execution, outcome } => match outcome {
                Outcome::Succeeded => info!("Build {execution} completed successfully"),
                other => warn!("Build {execution} finished: {other}"),
            },
            ProgressEvent::LogTail { execution, lines } => {
                warn!("Last {} lines of build {execution} output:", lines.len());
                for line in lines {
                    warn!("  {line}");
                }
            }
        }
        if event.is_long_wait_notice() {
            self.remind();
        }
    }
}
