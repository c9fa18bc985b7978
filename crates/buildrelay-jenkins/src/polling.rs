//! Shared pieces of the polling loops: notification cadence and cancellation.
//!
//! Notification cadence is derived from elapsed durations, never from poll
//! counts, so it stays correct when poll latency varies.

use buildrelay_core::Interrupted;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Emits at most one notification per fixed-width bucket of elapsed time.
///
/// Tracks the next eligible bucket index and only moves it forward, so a poll
/// that lands in an already reported bucket stays silent and a poll that
/// skips buckets reports once.
#[derive(Debug, Clone)]
pub struct BucketNotifier {
    width: Duration,
    next_bucket: u64,
}

impl BucketNotifier {
    /// Bucket 0 (the first `width` of elapsed time) is never reported.
    pub fn new(width: Duration) -> Self {
        Self {
            width,
            next_bucket: 1,
        }
    }

    /// Returns the bucket index to report for `elapsed`, if it is new.
    pub fn observe(&mut self, elapsed: Duration) -> Option<u64> {
        let width_ms = self.width.as_millis();
        if width_ms == 0 {
            return None;
        }
        let bucket = u64::try_from(elapsed.as_millis() / width_ms).unwrap_or(u64::MAX);
        if bucket >= self.next_bucket {
            self.next_bucket = bucket.saturating_add(1);
            Some(bucket)
        } else {
            None
        }
    }
}

/// Fires when at least `every` has passed since it last fired.
#[derive(Debug, Clone)]
pub struct IntervalNotifier {
    every: Duration,
    last: Instant,
}

impl IntervalNotifier {
    pub fn new(every: Duration, start: Instant) -> Self {
        Self { every, last: start }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.every {
            self.last = now;
            true
        } else {
            false
        }
    }
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupted> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted),
        out = fut => Ok(out),
    }
}

/// Sleep for `interval`, clipped so the sleep never passes `deadline`.
pub async fn sleep_until_next_poll(
    cancel: &CancellationToken,
    interval: Duration,
    deadline: Instant,
) -> Result<(), Interrupted> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    cancellable(cancel, tokio::time::sleep(interval.min(remaining))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIFTEEN_MIN: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn test_bucket_zero_is_silent() {
        let mut notifier = BucketNotifier::new(FIFTEEN_MIN);
        assert_eq!(notifier.observe(Duration::from_secs(0)), None);
        assert_eq!(notifier.observe(Duration::from_secs(14 * 60 + 59)), None);
    }

    #[test]
    fn test_one_notification_per_bucket() {
        let mut notifier = BucketNotifier::new(FIFTEEN_MIN);
        assert_eq!(notifier.observe(Duration::from_secs(15 * 60)), Some(1));
        assert_eq!(notifier.observe(Duration::from_secs(15 * 60 + 10)), None);
        assert_eq!(notifier.observe(Duration::from_secs(29 * 60)), None);
        assert_eq!(notifier.observe(Duration::from_secs(30 * 60 + 3)), Some(2));
    }

    #[test]
    fn test_skipped_buckets_report_once() {
        let mut notifier = BucketNotifier::new(FIFTEEN_MIN);
        assert_eq!(notifier.observe(Duration::from_secs(50 * 60)), Some(3));
        assert_eq!(notifier.observe(Duration::from_secs(55 * 60)), None);
        assert_eq!(notifier.observe(Duration::from_secs(60 * 60)), Some(4));
    }

    #[test]
    fn test_elapsed_going_backwards_is_silent() {
        // Clock skew between us and the server can make elapsed shrink.
        let mut notifier = BucketNotifier::new(FIFTEEN_MIN);
        assert_eq!(notifier.observe(Duration::from_secs(31 * 60)), Some(2));
        assert_eq!(notifier.observe(Duration::from_secs(16 * 60)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_notifier() {
        let start = Instant::now();
        let mut notifier = IntervalNotifier::new(FIFTEEN_MIN, start);
        assert!(!notifier.ready(start + Duration::from_secs(60)));
        assert!(notifier.ready(start + FIFTEEN_MIN));
        assert!(!notifier.ready(start + FIFTEEN_MIN + Duration::from_secs(60)));
        assert!(notifier.ready(start + FIFTEEN_MIN * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, async { 7 }).await;
        assert_eq!(result, Err(Interrupted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_clipped_to_deadline() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let deadline = start + Duration::from_secs(3);
        sleep_until_next_poll(&cancel, Duration::from_secs(10), deadline)
            .await
            .unwrap();
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
    }
}
