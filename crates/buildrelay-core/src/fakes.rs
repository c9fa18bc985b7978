//! In-memory fakes for the core traits (testing only)
//!
//! Provides `FakeVcs`, `MemoryMarkerStore`, `RecordingObserver` and
//! `StaticFacts` that satisfy the trait contracts without touching git,
//! the filesystem, or the network.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{CommitMarker, MarkerError, VcsError};
use crate::facts::FactSource;
use crate::git::Vcs;
use crate::marker::MarkerStore;
use crate::progress::{PipelineObserver, ProgressEvent};

// ---------------------------------------------------------------------------
// FakeVcs
// ---------------------------------------------------------------------------

/// Vcs returning a fixed head, or a fixed error.
#[derive(Debug)]
pub struct FakeVcs {
    head: Result<String, String>,
    lookups: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn with_head(head: &str) -> Self {
        Self {
            head: Ok(head.to_string()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            head: Err(message.to_string()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    /// Branches looked up so far.
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn remote_head(&self, branch: &str) -> Result<String, VcsError> {
        self.lookups.lock().unwrap().push(branch.to_string());
        self.head.clone().map_err(VcsError)
    }
}

// ---------------------------------------------------------------------------
// MemoryMarkerStore
// ---------------------------------------------------------------------------

/// Marker store backed by a `Mutex<Option<CommitMarker>>`.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    marker: Mutex<Option<CommitMarker>>,
    unreadable: bool,
    writes: Mutex<usize>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker(revision: &str) -> Self {
        Self {
            marker: Mutex::new(CommitMarker::new(revision)),
            ..Self::default()
        }
    }

    /// A store whose reads always fail.
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<CommitMarker> {
        self.marker.lock().unwrap().clone()
    }

    /// Number of successful `store` calls.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn load(&self) -> Result<Option<CommitMarker>, MarkerError> {
        if self.unreadable {
            return Err(MarkerError::Read {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "unreadable"),
            });
        }
        Ok(self.current())
    }

    async fn store(&self, marker: &CommitMarker) -> Result<(), MarkerError> {
        *self.marker.lock().unwrap() = Some(marker.clone());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Observer that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events matching `pred`.
    pub fn filtered(&self, pred: impl Fn(&ProgressEvent) -> bool) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| pred(e))
            .cloned()
            .collect()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// StaticFacts
// ---------------------------------------------------------------------------

/// Fact source that always returns the same text.
#[derive(Debug, Clone)]
pub struct StaticFacts(pub String);

#[async_trait]
impl FactSource for StaticFacts {
    async fn fact(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_marker_store_roundtrip() {
        let store = MemoryMarkerStore::new();
        assert!(store.load().await.unwrap().is_none());
        store
            .store(&CommitMarker::new("abc").unwrap())
            .await
            .unwrap();
        assert_eq!(store.current().unwrap().as_str(), "abc");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fake_vcs_records_lookups() {
        let vcs = FakeVcs::with_head("abc");
        assert_eq!(vcs.remote_head("master").await.unwrap(), "abc");
        assert_eq!(vcs.lookups(), vec!["master".to_string()]);
    }
}
