//! Queue resolver: waits for a triggered build to leave the queue.

use buildrelay_core::{
    BuildHandle, Clock, ExecutionId, PipelineObserver, PollingConfig, ProgressEvent,
    TrackingLocation,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::BuildServer;
use crate::error::{ApiError, QueueError};
use crate::polling::{cancellable, sleep_until_next_poll, BucketNotifier};

/// Queue polling cadence.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Width of the queued-time buckets that get one progress notice each.
    pub notify_every: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for QueueSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.queue_interval_secs),
            timeout: Duration::from_secs(config.queue_timeout_secs),
            notify_every: Duration::from_secs(config.queue_notify_every_secs),
        }
    }
}

/// What one poll of the queue item showed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum QueuePoll {
    Waiting,
    Started {
        execution: ExecutionId,
        queued_for: Option<Duration>,
    },
    Cancelled(Option<String>),
}

/// Polls a queue item until it turns into an executing build.
pub struct QueueResolver {
    server: Arc<dyn BuildServer>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PipelineObserver>,
    settings: QueueSettings,
}

impl QueueResolver {
    pub fn new(
        server: Arc<dyn BuildServer>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn PipelineObserver>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            server,
            clock,
            observer,
            settings,
        }
    }

    /// Wait up to the configured timeout for `handle` to start executing.
    pub async fn resolve(
        &self,
        handle: &BuildHandle,
        cancel: &CancellationToken,
    ) -> Result<ExecutionId, QueueError> {
        self.resolve_execution(handle, self.settings.timeout, cancel)
            .await
    }

    /// Wait up to `timeout` for `handle` to start executing.
    ///
    /// Poll errors are logged and retried; they do not extend the timeout,
    /// which is measured from the first poll.
    pub async fn resolve_execution(
        &self,
        handle: &BuildHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionId, QueueError> {
        let queue_url = match handle.location() {
            TrackingLocation::Execution(execution) => {
                warn!(
                    build = %execution,
                    source = handle.source().name(),
                    "Handle already names a build; skipping queue wait (may not be your run)"
                );
                return Ok(*execution);
            }
            TrackingLocation::QueueItem(url) => url.as_str(),
        };

        info!("Build is in queue; this usually takes 30-60 minutes if another build is running");
        self.observer.on_event(&ProgressEvent::WaitStarted {
            label: "Waiting in build queue".to_string(),
        });
        let result = self.poll_loop(queue_url, timeout, cancel).await;
        self.observer.on_event(&ProgressEvent::WaitFinished);
        result
    }

    async fn poll_loop(
        &self,
        queue_url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionId, QueueError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut buckets = BucketNotifier::new(self.settings.notify_every);

        loop {
            match cancellable(cancel, self.poll_once(queue_url, &mut buckets)).await? {
                Ok(QueuePoll::Started {
                    execution,
                    queued_for,
                }) => {
                    let queued_for = queued_for.unwrap_or_else(|| started.elapsed());
                    self.observer.on_event(&ProgressEvent::ExecutionStarted {
                        execution,
                        queued_for,
                    });
                    return Ok(execution);
                }
                Ok(QueuePoll::Cancelled(why)) => {
                    warn!(why = why.as_deref().unwrap_or(""), "Queue item was cancelled");
                    return Err(QueueError::Cancelled { why });
                }
                Ok(QueuePoll::Waiting) => {}
                Err(e) => warn!(error = %e, "Queue poll failed; retrying"),
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep_until_next_poll(cancel, self.settings.interval, deadline).await?;
        }

        warn!(timeout_secs = timeout.as_secs(), "Timeout waiting for build to start");
        Err(QueueError::Timeout {
            waited: started.elapsed(),
        })
    }

    async fn poll_once(
        &self,
        queue_url: &str,
        buckets: &mut BucketNotifier,
    ) -> Result<QueuePoll, ApiError> {
        let item = self.server.queue_item(queue_url).await?;
        let queued_for = item.in_queue_since.map(|since| self.queued_for(since));

        if let Some(execution) = item.execution() {
            return Ok(QueuePoll::Started {
                execution,
                queued_for,
            });
        }
        if item.cancelled {
            return Ok(QueuePoll::Cancelled(item.why));
        }

        if let Some(queued_for) = queued_for {
            debug!(queued_secs = queued_for.as_secs(), "Still queued");
            if buckets.observe(queued_for).is_some() {
                self.observer.on_event(&ProgressEvent::StillQueued {
                    minutes: queued_for.as_secs() / 60,
                    why: item.why.filter(|w| !w.trim().is_empty()),
                });
            }
        }
        Ok(QueuePoll::Waiting)
    }

    fn queued_for(&self, in_queue_since: i64) -> Duration {
        let millis = self.clock.now_millis().saturating_sub(in_queue_since).max(0);
        Duration::from_millis(u64::try_from(millis).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::QueueItem;
    use crate::fakes::FakeBuildServer;
    use buildrelay_core::fakes::RecordingObserver;
    use buildrelay_core::AnchoredClock;

    const EPOCH: i64 = 1_700_000_000_000;

    fn resolver(
        server: Arc<FakeBuildServer>,
        observer: Arc<RecordingObserver>,
    ) -> QueueResolver {
        QueueResolver::new(
            server,
            Arc::new(AnchoredClock::starting_at(EPOCH)),
            observer,
            QueueSettings::default(),
        )
    }

    fn handle() -> BuildHandle {
        BuildHandle::from_trigger_response("https://ci/queue/item/7/")
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_after_two_polls() {
        let server = Arc::new(
            FakeBuildServer::new()
                .push_queue_poll(Ok(QueueItem::pending(EPOCH, Some("Waiting"))), 1)
                .push_queue_poll(Ok(QueueItem::started(41, EPOCH)), 1),
        );
        let observer = Arc::new(RecordingObserver::new());
        let resolver = resolver(server.clone(), observer.clone());

        let execution = resolver
            .resolve(&handle(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(execution, ExecutionId::new(41).unwrap());
        assert_eq!(server.calls().queue_item, 2);

        let started = observer.filtered(|e| matches!(e, ProgressEvent::ExecutionStarted { .. }));
        assert_eq!(
            started,
            vec![ProgressEvent::ExecutionStarted {
                execution: ExecutionId::new(41).unwrap(),
                queued_for: Duration::from_secs(10),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_confidence_handle_skips_polling() {
        let server = Arc::new(FakeBuildServer::new());
        let resolver = resolver(server.clone(), Arc::new(RecordingObserver::new()));
        let handle = BuildHandle::from_last_known_build(ExecutionId::new(9).unwrap());

        let execution = resolver
            .resolve(&handle, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(execution.number(), 9);
        assert_eq!(server.calls().queue_item, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_queue_item() {
        let server = Arc::new(FakeBuildServer::new().push_queue_poll(
            Ok(QueueItem {
                cancelled: true,
                why: Some("Cancelled by admin".to_string()),
                ..QueueItem::default()
            }),
            1,
        ));
        let resolver = resolver(server, Arc::new(RecordingObserver::new()));

        let err = resolver
            .resolve(&handle(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::Cancelled {
                why: Some("Cancelled by admin".to_string())
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_events_bracket_the_loop() {
        let server = Arc::new(
            FakeBuildServer::new().push_queue_poll(Ok(QueueItem::started(3, EPOCH)), 1),
        );
        let observer = Arc::new(RecordingObserver::new());
        let resolver = resolver(server, observer.clone());
        resolver
            .resolve(&handle(), &CancellationToken::new())
            .await
            .unwrap();

        let events = observer.events();
        assert!(matches!(events.first(), Some(ProgressEvent::WaitStarted { .. })));
        assert_eq!(events.last(), Some(&ProgressEvent::WaitFinished));
    }
}
