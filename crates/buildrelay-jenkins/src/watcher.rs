//! Completion watcher: polls an executing build until it is terminal.

use buildrelay_core::{
    ExecutionId, Interrupted, Outcome, PipelineObserver, PollingConfig, ProgressEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{BuildServer, BuildStatus, SUCCESS_RESULT};
use crate::error::BuildFailure;
use crate::polling::{cancellable, sleep_until_next_poll, IntervalNotifier};

/// Failure reason recorded when the build outlives the watch timeout.
pub const TIMEOUT_REASON: &str = "timeout";

/// Reported when the server marks a build finished without a result.
pub const UNKNOWN_RESULT: &str = "UNKNOWN";

/// Build polling cadence.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Minimum wall-clock time between "still building" notices.
    pub notify_every: Duration,
    /// Console lines kept for a failed build.
    pub log_tail_lines: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for WatchSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.build_interval_secs),
            timeout: Duration::from_secs(config.build_timeout_secs),
            notify_every: Duration::from_secs(config.build_notify_every_secs),
            log_tail_lines: config.log_tail_lines,
        }
    }
}

/// Terminal state of a watched build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub execution: ExecutionId,
    /// Never `Pending`.
    pub outcome: Outcome,
    /// Console tail; empty on success or when the log could not be fetched.
    pub log_tail: Vec<String>,
    pub elapsed: Duration,
}

impl Completion {
    pub fn into_result(self) -> Result<ExecutionId, BuildFailure> {
        match self.outcome {
            Outcome::Succeeded => Ok(self.execution),
            Outcome::Failed(result) => Err(BuildFailure {
                execution: self.execution,
                result,
                log_tail: self.log_tail,
            }),
            Outcome::Pending => Err(BuildFailure {
                execution: self.execution,
                result: UNKNOWN_RESULT.to_string(),
                log_tail: self.log_tail,
            }),
        }
    }
}

/// Classify one status response.
pub fn classify(status: &BuildStatus) -> Outcome {
    if status.building {
        return Outcome::Pending;
    }
    match status.result.as_deref() {
        Some(SUCCESS_RESULT) => Outcome::Succeeded,
        Some(other) => Outcome::Failed(other.to_string()),
        None => Outcome::Failed(UNKNOWN_RESULT.to_string()),
    }
}

/// Last `n` non-blank lines of `text`, oldest first.
pub fn console_tail(text: &str, n: usize) -> Vec<String> {
    let mut tail: Vec<String> = text
        .lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .take(n)
        .map(|line| line.trim_end().to_string())
        .collect();
    tail.reverse();
    tail
}

/// Polls a build until it reaches a terminal result or the timeout passes.
pub struct CompletionWatcher {
    server: Arc<dyn BuildServer>,
    observer: Arc<dyn PipelineObserver>,
    settings: WatchSettings,
}

impl CompletionWatcher {
    pub fn new(
        server: Arc<dyn BuildServer>,
        observer: Arc<dyn PipelineObserver>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            server,
            observer,
            settings,
        }
    }

    /// Watch `execution` with the configured timeout.
    pub async fn watch(
        &self,
        execution: ExecutionId,
        cancel: &CancellationToken,
    ) -> Result<Completion, Interrupted> {
        self.await_completion(execution, self.settings.timeout, cancel)
            .await
    }

    /// Watch `execution` for at most `max_wait`.
    ///
    /// Only cancellation is an error here; a failed or timed-out build is a
    /// [`Completion`] with a `Failed` outcome.
    pub async fn await_completion(
        &self,
        execution: ExecutionId,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Completion, Interrupted> {
        info!(build = %execution, "Monitoring build");
        self.observer.on_event(&ProgressEvent::WaitStarted {
            label: format!("Build {execution} running"),
        });
        let polled = self.poll_loop(execution, max_wait, cancel).await;
        self.observer.on_event(&ProgressEvent::WaitFinished);
        let (outcome, elapsed) = polled?;

        self.observer.on_event(&ProgressEvent::BuildFinished {
            execution,
            outcome: outcome.clone(),
        });

        let log_tail = match &outcome {
            Outcome::Failed(_) => {
                let lines = self.fetch_tail(execution, cancel).await?;
                if !lines.is_empty() {
                    self.observer.on_event(&ProgressEvent::LogTail {
                        execution,
                        lines: lines.clone(),
                    });
                }
                lines
            }
            _ => Vec::new(),
        };

        Ok(Completion {
            execution,
            outcome,
            log_tail,
            elapsed,
        })
    }

    async fn poll_loop(
        &self,
        execution: ExecutionId,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<(Outcome, Duration), Interrupted> {
        let started = Instant::now();
        let deadline = started + max_wait;
        let mut notifier = IntervalNotifier::new(self.settings.notify_every, started);

        loop {
            match cancellable(cancel, self.server.build_status(execution)).await? {
                Ok(status) => match classify(&status) {
                    Outcome::Pending => {
                        let now = Instant::now();
                        debug!(
                            build = %execution,
                            elapsed_secs = (now - started).as_secs(),
                            "Still building"
                        );
                        if notifier.ready(now) {
                            self.observer.on_event(&ProgressEvent::StillBuilding {
                                execution,
                                elapsed: now - started,
                            });
                        }
                    }
                    terminal => return Ok((terminal, started.elapsed())),
                },
                Err(e) => warn!(build = %execution, error = %e, "Build status poll failed; retrying"),
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep_until_next_poll(cancel, self.settings.interval, deadline).await?;
        }

        warn!(
            build = %execution,
            timeout_secs = max_wait.as_secs(),
            "Build did not finish before the timeout"
        );
        Ok((Outcome::Failed(TIMEOUT_REASON.to_string()), started.elapsed()))
    }

    async fn fetch_tail(
        &self,
        execution: ExecutionId,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, Interrupted> {
        match cancellable(cancel, self.server.console_text(execution)).await? {
            Ok(text) => Ok(console_tail(&text, self.settings.log_tail_lines)),
            Err(e) => {
                warn!(build = %execution, error = %e, "Could not fetch console output");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeBuildServer;
    use buildrelay_core::fakes::RecordingObserver;

    fn id(n: u64) -> ExecutionId {
        ExecutionId::new(n).unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&BuildStatus::running()), Outcome::Pending);
        assert_eq!(classify(&BuildStatus::finished("SUCCESS")), Outcome::Succeeded);
        assert_eq!(
            classify(&BuildStatus::finished("UNSTABLE")),
            Outcome::Failed("UNSTABLE".to_string())
        );
        let no_result = BuildStatus {
            building: false,
            result: None,
        };
        assert_eq!(classify(&no_result), Outcome::Failed("UNKNOWN".to_string()));
    }

    #[test]
    fn test_console_tail_skips_blank_lines() {
        let text = "one\n\ntwo\n   \nthree\nfour\n\n";
        assert_eq!(console_tail(text, 3), vec!["two", "three", "four"]);
        assert_eq!(console_tail(text, 10), vec!["one", "two", "three", "four"]);
        assert!(console_tail("", 20).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_has_no_tail() {
        let server = Arc::new(
            FakeBuildServer::new()
                .push_build_poll(Ok(BuildStatus::running()), 2)
                .push_build_poll(Ok(BuildStatus::finished("SUCCESS")), 1)
                .with_console("should not be fetched"),
        );
        let watcher = CompletionWatcher::new(
            server.clone(),
            Arc::new(RecordingObserver::new()),
            WatchSettings::default(),
        );

        let completion = watcher.watch(id(5), &CancellationToken::new()).await.unwrap();
        assert_eq!(completion.outcome, Outcome::Succeeded);
        assert_eq!(completion.elapsed, Duration::from_secs(120));
        assert!(completion.log_tail.is_empty());
        assert_eq!(server.calls().console_text, 0);
        assert_eq!(completion.into_result(), Ok(id(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_carries_tail() {
        let server = Arc::new(
            FakeBuildServer::new()
                .push_build_poll(Ok(BuildStatus::finished("FAILURE")), 1)
                .with_console("compiling\nERROR: 3 tests failed\nFinished: FAILURE\n"),
        );
        let observer = Arc::new(RecordingObserver::new());
        let watcher =
            CompletionWatcher::new(server, observer.clone(), WatchSettings::default());

        let failure = watcher
            .watch(id(6), &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(failure.result, "FAILURE");
        assert_eq!(failure.log_tail.last().map(String::as_str), Some("Finished: FAILURE"));
        assert_eq!(
            observer
                .filtered(|e| matches!(e, ProgressEvent::LogTail { .. }))
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_failure_leaves_empty_tail() {
        let server = Arc::new(
            FakeBuildServer::new()
                .push_build_poll(Ok(BuildStatus::finished("ABORTED")), 1)
                .with_failing_console("HTTP 404"),
        );
        let watcher = CompletionWatcher::new(
            server,
            Arc::new(RecordingObserver::new()),
            WatchSettings::default(),
        );
        let completion = watcher.watch(id(7), &CancellationToken::new()).await.unwrap();
        assert_eq!(completion.outcome, Outcome::Failed("ABORTED".to_string()));
        assert!(completion.log_tail.is_empty());
    }
}
