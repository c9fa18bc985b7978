//! Wall-clock source for server-relative timestamps.
//!
//! Poll loops measure their own elapsed time with `tokio::time::Instant`; the
//! clock is only needed where a duration is derived from a timestamp the
//! build server reports (epoch milliseconds).

/// Source of the current time in Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock anchored at a fixed epoch time that advances with the tokio clock.
///
/// Under a paused tokio runtime it moves only when virtual time does.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    epoch_millis: i64,
    origin: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn starting_at(epoch_millis: i64) -> Self {
        Self {
            epoch_millis,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now_millis(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.epoch_millis.saturating_add(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_follows_virtual_time() {
        let clock = AnchoredClock::starting_at(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now_millis(), 91_000);
    }
}
