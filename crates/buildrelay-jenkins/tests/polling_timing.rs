//! Timing behavior of the queue and build polling loops under paused time.

use std::sync::Arc;
use std::time::Duration;

use buildrelay_core::fakes::RecordingObserver;
use buildrelay_core::{AnchoredClock, BuildHandle, ExecutionId, Outcome, ProgressEvent};
use buildrelay_jenkins::fakes::FakeBuildServer;
use buildrelay_jenkins::{
    BuildStatus, CompletionWatcher, QueueError, QueueItem, QueueResolver, QueueSettings,
    WatchSettings,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const EPOCH: i64 = 1_700_000_000_000;

fn queue_resolver(server: Arc<FakeBuildServer>, observer: Arc<RecordingObserver>) -> QueueResolver {
    QueueResolver::new(
        server,
        Arc::new(AnchoredClock::starting_at(EPOCH)),
        observer,
        QueueSettings::default(),
    )
}

fn watcher(server: Arc<FakeBuildServer>, observer: Arc<RecordingObserver>) -> CompletionWatcher {
    CompletionWatcher::new(server, observer, WatchSettings::default())
}

fn queued_handle() -> BuildHandle {
    BuildHandle::from_trigger_response("https://ci.example.com/queue/item/314/")
}

fn still_queued(observer: &RecordingObserver) -> Vec<u64> {
    observer
        .filtered(|e| matches!(e, ProgressEvent::StillQueued { .. }))
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::StillQueued { minutes, .. } => Some(minutes),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_forty_five_minute_queue_notifies_three_times() {
    // Polls at 0s, 10s, ... 2700s are pending; the poll at 2710s sees the build.
    let server = Arc::new(
        FakeBuildServer::new()
            .push_queue_poll(
                Ok(QueueItem::pending(EPOCH, Some("Waiting for next available executor"))),
                271,
            )
            .push_queue_poll(Ok(QueueItem::started(412, EPOCH)), 1),
    );
    let observer = Arc::new(RecordingObserver::new());
    let resolver = queue_resolver(server.clone(), observer.clone());

    let execution = resolver
        .resolve(&queued_handle(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(execution, ExecutionId::new(412).unwrap());
    assert_eq!(server.calls().queue_item, 272);
    assert_eq!(still_queued(&observer), vec![15, 30, 45]);
    assert_eq!(
        observer.filtered(|e| matches!(e, ProgressEvent::ExecutionStarted { .. })),
        vec![ProgressEvent::ExecutionStarted {
            execution,
            queued_for: Duration::from_secs(45 * 60 + 10),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_notifications_follow_server_enqueue_time() {
    // Enqueued 14m55s before we started polling: first notice at our 5s poll.
    let since = EPOCH - (14 * 60 + 55) * 1000;
    let server = Arc::new(
        FakeBuildServer::new()
            .push_queue_poll(Ok(QueueItem::pending(since, None)), 4)
            .push_queue_poll(Ok(QueueItem::started(9, since)), 1),
    );
    let observer = Arc::new(RecordingObserver::new());
    let resolver = queue_resolver(server, observer.clone());

    resolver
        .resolve(&queued_handle(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(still_queued(&observer), vec![15]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_timeout_is_measured_from_loop_start() {
    let server = Arc::new(FakeBuildServer::new().push_queue_poll(
        Err(FakeBuildServer::transport_error("connection reset")),
        1,
    ));
    let resolver = queue_resolver(server.clone(), Arc::new(RecordingObserver::new()));
    let start = Instant::now();

    let err = resolver
        .resolve_execution(
            &queued_handle(),
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        QueueError::Timeout {
            waited: Duration::from_secs(60)
        }
    );
    assert_eq!(Instant::now() - start, Duration::from_secs(60));
    // 0, 10, ... 60: the last poll lands exactly on the deadline.
    assert_eq!(server.calls().queue_item, 7);
}

#[tokio::test(start_paused = true)]
async fn test_queue_poll_at_deadline_can_still_succeed() {
    let server = Arc::new(
        FakeBuildServer::new()
            .push_queue_poll(Ok(QueueItem::pending(EPOCH, None)), 3)
            .push_queue_poll(Ok(QueueItem::started(21, EPOCH)), 1),
    );
    let resolver = queue_resolver(server, Arc::new(RecordingObserver::new()));

    let execution = resolver
        .resolve_execution(
            &queued_handle(),
            Duration::from_secs(25),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(execution.number(), 21);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_queue_polling_promptly() {
    let server = Arc::new(
        FakeBuildServer::new().push_queue_poll(Ok(QueueItem::pending(EPOCH, None)), 1),
    );
    let resolver = queue_resolver(server.clone(), Arc::new(RecordingObserver::new()));
    let cancel = CancellationToken::new();

    let interrupter = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(35)).await;
            cancel.cancel();
        })
    };

    let start = Instant::now();
    let err = resolver.resolve(&queued_handle(), &cancel).await.unwrap_err();
    interrupter.await.unwrap();

    assert!(matches!(err, QueueError::Interrupted(_)));
    assert_eq!(Instant::now() - start, Duration::from_secs(35));
    assert_eq!(server.calls().queue_item, 4);
}

#[tokio::test(start_paused = true)]
async fn test_build_success_after_three_polls() {
    let server = Arc::new(
        FakeBuildServer::new()
            .push_build_poll(Ok(BuildStatus::running()), 2)
            .push_build_poll(Ok(BuildStatus::finished("SUCCESS")), 1),
    );
    let watcher = watcher(server.clone(), Arc::new(RecordingObserver::new()));

    let completion = watcher
        .watch(ExecutionId::new(412).unwrap(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(completion.outcome, Outcome::Succeeded);
    assert_eq!(server.calls().build_status, 3);
}

#[tokio::test(start_paused = true)]
async fn test_non_success_results_fail_with_bounded_tail() {
    let console: String = (1..=50).map(|i| format!("line {i}\n\n")).collect();
    for result in ["FAILURE", "ABORTED", "UNSTABLE"] {
        let server = Arc::new(
            FakeBuildServer::new()
                .push_build_poll(Ok(BuildStatus::finished(result)), 1)
                .with_console(&console),
        );
        let watcher = watcher(server, Arc::new(RecordingObserver::new()));

        let failure = watcher
            .watch(ExecutionId::new(3).unwrap(), &CancellationToken::new())
            .await
            .unwrap()
            .into_result()
            .unwrap_err();
        assert_eq!(failure.result, result);
        assert_eq!(failure.log_tail.len(), 20);
        assert_eq!(failure.log_tail.first().map(String::as_str), Some("line 31"));
        assert_eq!(failure.log_tail.last().map(String::as_str), Some("line 50"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_still_building_notices_are_time_gated() {
    // Running for 40 minutes, then success: notices at 15 and 30 minutes.
    let server = Arc::new(
        FakeBuildServer::new()
            .push_build_poll(Ok(BuildStatus::running()), 40)
            .push_build_poll(Ok(BuildStatus::finished("SUCCESS")), 1),
    );
    let observer = Arc::new(RecordingObserver::new());
    let watcher = watcher(server, observer.clone());

    watcher
        .watch(ExecutionId::new(8).unwrap(), &CancellationToken::new())
        .await
        .unwrap();

    let elapsed: Vec<Duration> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::StillBuilding { elapsed, .. } => Some(elapsed),
            _ => None,
        })
        .collect();
    assert_eq!(
        elapsed,
        vec![Duration::from_secs(15 * 60), Duration::from_secs(30 * 60)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_build_timeout_is_failed_timeout() {
    let server = Arc::new(
        FakeBuildServer::new()
            .push_build_poll(Ok(BuildStatus::running()), 1)
            .with_console("still compiling\n"),
    );
    let watcher = watcher(server, Arc::new(RecordingObserver::new()));

    let completion = watcher
        .await_completion(
            ExecutionId::new(4).unwrap(),
            Duration::from_secs(300),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(completion.outcome, Outcome::Failed("timeout".to_string()));
    assert_eq!(completion.elapsed, Duration::from_secs(300));
    assert_eq!(completion.log_tail, vec!["still compiling".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_build_errors_do_not_extend_timeout() {
    let server = Arc::new(FakeBuildServer::new().push_build_poll(
        Err(FakeBuildServer::transport_error("HTTP 502")),
        1,
    ));
    let watcher = watcher(server.clone(), Arc::new(RecordingObserver::new()));
    let start = Instant::now();

    let completion = watcher
        .await_completion(
            ExecutionId::new(4).unwrap(),
            Duration::from_secs(180),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(completion.outcome, Outcome::Failed("timeout".to_string()));
    assert_eq!(Instant::now() - start, Duration::from_secs(180));
    assert_eq!(server.calls().build_status, 4);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_then_success() {
    let server = Arc::new(
        FakeBuildServer::new()
            .push_build_poll(Err(FakeBuildServer::transport_error("HTTP 503")), 2)
            .push_build_poll(Ok(BuildStatus::finished("SUCCESS")), 1),
    );
    let watcher = watcher(server, Arc::new(RecordingObserver::new()));
    let completion = watcher
        .watch(ExecutionId::new(2).unwrap(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(completion.outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_build_watch() {
    let server = Arc::new(FakeBuildServer::new());
    let watcher = watcher(server, Arc::new(RecordingObserver::new()));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        trigger.cancel();
    });

    let result = watcher.watch(ExecutionId::new(2).unwrap(), &cancel).await;
    assert!(result.is_err());
}
