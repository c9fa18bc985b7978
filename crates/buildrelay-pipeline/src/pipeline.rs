//! Pipeline orchestration: gate, trigger, queue, build, UI automation.

use buildrelay_browser::{BrowserLauncher, ChromeLauncher, UiAutomationDriver, UiError, UiTimeouts};
use buildrelay_core::{
    emit_pipeline_finished, emit_pipeline_started, emit_stage_failed, emit_stage_finished,
    emit_stage_started, Clock, CommitGate, CommitMarker, FileMarkerStore, GateDecision, GitVcs,
    Interrupted, MarkerStore, PipelineObserver, ProgressEvent, RelayConfig, RunSpan, Stage,
    SystemClock, Vcs,
};
use buildrelay_jenkins::polling::cancellable;
use buildrelay_jenkins::{
    ApiError, BuildServer, BuildTrigger, CompletionWatcher, JenkinsClient, QueueError,
    QueueResolver, QueueSettings, WatchSettings,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::StageError;
use crate::report::{PipelineReport, RunOutcome, StageRecord};

/// External collaborators of a pipeline.
pub struct Dependencies {
    pub vcs: Arc<dyn Vcs>,
    pub markers: Arc<dyn MarkerStore>,
    pub server: Arc<dyn BuildServer>,
    pub launcher: Box<dyn BrowserLauncher>,
    pub clock: Arc<dyn Clock>,
    pub observer: Arc<dyn PipelineObserver>,
}

impl Dependencies {
    /// git, the marker file, Jenkins and Chrome as described by `config`.
    pub fn production(
        config: &RelayConfig,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            vcs: Arc::new(GitVcs::new(
                config.repository.dir.clone(),
                config.repository.remote.clone(),
            )),
            markers: Arc::new(FileMarkerStore::new(config.marker_path())),
            server: Arc::new(JenkinsClient::new(&config.jenkins)?),
            launcher: Box::new(ChromeLauncher::new(config.webdriver.clone())),
            clock: Arc::new(SystemClock),
            observer,
        })
    }
}

/// Control flow of one stage.
enum Step<T> {
    Next(T),
    Stop(RunOutcome),
}

/// The five-stage release pipeline.
///
/// Stages run strictly in order and the first failure ends the run. The
/// commit marker is only written after every stage has succeeded.
pub struct Pipeline {
    gate: CommitGate,
    trigger: BuildTrigger,
    params: BTreeMap<String, String>,
    queue: QueueResolver,
    watcher: CompletionWatcher,
    ui: UiAutomationDriver,
    markers: Arc<dyn MarkerStore>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    pub fn new(config: &RelayConfig, deps: Dependencies) -> Self {
        Self {
            gate: CommitGate::new(
                deps.vcs,
                Arc::clone(&deps.markers),
                config.repository.branch.clone(),
            ),
            trigger: BuildTrigger::new(Arc::clone(&deps.server), config.jenkins.job_name.clone()),
            params: config.jenkins.build_params(),
            queue: QueueResolver::new(
                Arc::clone(&deps.server),
                deps.clock,
                Arc::clone(&deps.observer),
                QueueSettings::from(&config.polling),
            ),
            watcher: CompletionWatcher::new(
                deps.server,
                Arc::clone(&deps.observer),
                WatchSettings::from(&config.polling),
            ),
            ui: UiAutomationDriver::new(
                deps.launcher,
                config.tem.clone(),
                UiTimeouts::from(&config.webdriver),
            ),
            markers: deps.markers,
            observer: deps.observer,
        }
    }

    /// Run every stage for the current remote head.
    pub async fn run(&self, cancel: &CancellationToken) -> PipelineReport {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::span(&run_id);
        self.run_inner(run_id, cancel).instrument(span).await
    }

    async fn run_inner(&self, run_id: String, cancel: &CancellationToken) -> PipelineReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut run = RunState {
            run_id,
            stages: Vec::new(),
            observer: Arc::clone(&self.observer),
        };

        let outcome = self.execute(&mut run, cancel).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        emit_pipeline_finished(&run.run_id, duration_ms, outcome.status());
        match &outcome {
            RunOutcome::Completed { revision, .. } => {
                info!(revision = %revision.short(), "Automation completed successfully")
            }
            RunOutcome::Failed { error, .. } => warn!(error = %error, "Automation failed"),
            RunOutcome::Interrupted { stage } => warn!(stage = %stage, "Interrupted by user"),
            RunOutcome::UpToDate { .. } => info!("No new commits to process"),
        }

        PipelineReport {
            run_id: run.run_id,
            started_at,
            duration_ms,
            stages: run.stages,
            outcome,
        }
    }

    async fn execute(&self, run: &mut RunState, cancel: &CancellationToken) -> RunOutcome {
        let revision = match self.gate_stage(run).await {
            Step::Next(head) => head,
            Step::Stop(outcome) => return outcome,
        };
        emit_pipeline_started(&run.run_id, revision.as_str());

        let staged = async {
            let handle = run
                .stage(Stage::Trigger, async {
                    cancellable(cancel, self.trigger.trigger_build(&self.params))
                        .await
                        .map(|r| r.map_err(StageError::from))
                })
                .await?;
            if handle.is_low_confidence() {
                warn!(handle = %handle, "Tracking a build that may not be ours");
            }

            let execution = run
                .stage(Stage::Queue, async {
                    match self.queue.resolve(&handle, cancel).await {
                        Err(QueueError::Interrupted(i)) => Err(i),
                        other => Ok(other.map_err(StageError::from)),
                    }
                })
                .await?;

            let execution = run
                .stage(Stage::Build, async {
                    self.watcher
                        .watch(execution, cancel)
                        .await
                        .map(|completion| completion.into_result().map_err(StageError::from))
                })
                .await?;

            let submission = run
                .stage(Stage::UiAutomation, async {
                    match self.ui.submit(cancel).await {
                        Err(UiError::Interrupted(i)) => Err(i),
                        other => Ok(other.map_err(StageError::from)),
                    }
                })
                .await?;

            Ok::<_, Stop>((execution, submission))
        }
        .await;

        let (execution, submission) = match staged {
            Ok(done) => done,
            Err(Stop::Interrupted(stage)) => return RunOutcome::Interrupted { stage },
            Err(Stop::Failed(error)) => return RunOutcome::Failed { revision, error },
        };

        if let Err(e) = self.markers.store(&revision).await {
            warn!(error = %e, "Could not update processed commit");
            return RunOutcome::Failed {
                revision,
                error: StageError::from(e),
            };
        }
        info!(revision = %revision.short(), "Processed commit recorded");

        RunOutcome::Completed {
            revision,
            execution,
            submission,
        }
    }

    async fn gate_stage(&self, run: &mut RunState) -> Step<CommitMarker> {
        let timer = run.begin(Stage::Gate);
        let decision = self.gate.evaluate().await;
        run.end(timer, true);

        match decision {
            Ok(GateDecision::Proceed { head, previous }) => {
                info!(
                    head = %head.short(),
                    previous = previous.as_ref().map(CommitMarker::short).unwrap_or("none"),
                    "New commit detected"
                );
                Step::Next(head)
            }
            Ok(GateDecision::UpToDate(head)) => {
                Step::Stop(RunOutcome::UpToDate { head: Some(head) })
            }
            Err(e) => {
                warn!(error = %e, "Commit check failed; treating as no new commit");
                Step::Stop(RunOutcome::UpToDate { head: None })
            }
        }
    }
}

/// Why the staged part of a run stopped early.
enum Stop {
    Interrupted(Stage),
    Failed(StageError),
}

struct StageTimer {
    stage: Stage,
    start: Instant,
}

/// Per-run bookkeeping shared by the stages.
struct RunState {
    run_id: String,
    stages: Vec<StageRecord>,
    observer: Arc<dyn PipelineObserver>,
}

impl RunState {
    fn begin(&self, stage: Stage) -> StageTimer {
        emit_stage_started(&self.run_id, stage);
        self.observer.on_event(&ProgressEvent::StageStarted(stage));
        StageTimer {
            stage,
            start: Instant::now(),
        }
    }

    fn end(&mut self, timer: StageTimer, success: bool) {
        let duration_ms = timer.start.elapsed().as_millis() as u64;
        emit_stage_finished(&self.run_id, timer.stage, duration_ms, success);
        self.observer.on_event(&ProgressEvent::StageFinished {
            stage: timer.stage,
            ok: success,
        });
        self.stages.push(StageRecord {
            stage: timer.stage,
            duration_ms,
            success,
        });
    }

    /// Run one stage body, record it, and map its result to control flow.
    ///
    /// The body returns `Err(Interrupted)` when cancelled, otherwise the
    /// stage's own result.
    async fn stage<T>(
        &mut self,
        stage: Stage,
        body: impl Future<Output = Result<Result<T, StageError>, Interrupted>>,
    ) -> Result<T, Stop> {
        let timer = self.begin(stage);
        match body.await {
            Ok(Ok(value)) => {
                self.end(timer, true);
                Ok(value)
            }
            Ok(Err(error)) => {
                emit_stage_failed(&self.run_id, stage, &error);
                self.end(timer, false);
                Err(Stop::Failed(error))
            }
            Err(_) => {
                self.end(timer, false);
                Err(Stop::Interrupted(stage))
            }
        }
    }
}
