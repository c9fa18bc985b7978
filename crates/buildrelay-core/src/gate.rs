//! Commit gate: decides whether the remote branch tip needs processing.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{CommitMarker, GateError, VcsError};
use crate::git::Vcs;
use crate::marker::MarkerStore;

/// Result of comparing the remote head with the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The head has not been processed yet.
    Proceed {
        head: CommitMarker,
        previous: Option<CommitMarker>,
    },

    /// The head equals the marker; nothing to do.
    UpToDate(CommitMarker),
}

/// Whether `head` differs from the last processed `marker`.
///
/// A missing marker means no prior run, so every head counts as new.
pub fn should_proceed(head: &CommitMarker, marker: Option<&CommitMarker>) -> bool {
    marker != Some(head)
}

/// Read-only comparison of the tracked branch tip against the commit marker.
pub struct CommitGate {
    vcs: Arc<dyn Vcs>,
    markers: Arc<dyn MarkerStore>,
    branch: String,
}

impl CommitGate {
    pub fn new(vcs: Arc<dyn Vcs>, markers: Arc<dyn MarkerStore>, branch: impl Into<String>) -> Self {
        Self {
            vcs,
            markers,
            branch: branch.into(),
        }
    }

    /// Compare the remote head with the marker, surfacing lookup errors.
    pub async fn evaluate(&self) -> Result<GateDecision, GateError> {
        let raw = self.vcs.remote_head(&self.branch).await?;
        let head = CommitMarker::new(&raw)
            .ok_or_else(|| VcsError(format!("empty revision for branch {}", self.branch)))?;
        let previous = self.markers.load().await?;

        if should_proceed(&head, previous.as_ref()) {
            Ok(GateDecision::Proceed { head, previous })
        } else {
            Ok(GateDecision::UpToDate(head))
        }
    }

    /// The new revision to process, or `None` when there is nothing to do.
    ///
    /// Fail-closed: any lookup error is logged and reported as "no new commit".
    pub async fn check_for_new_commit(&self) -> Option<CommitMarker> {
        match self.evaluate().await {
            Ok(GateDecision::Proceed { head, previous }) => {
                info!(
                    head = %head.short(),
                    previous = previous.as_ref().map(|p| p.short()).unwrap_or("none"),
                    "New commit detected"
                );
                Some(head)
            }
            Ok(GateDecision::UpToDate(head)) => {
                info!(head = %head.short(), "No new commits");
                None
            }
            Err(e) => {
                warn!(error = %e, "Commit check failed; treating as no new commit");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeVcs, MemoryMarkerStore};

    fn marker(s: &str) -> CommitMarker {
        CommitMarker::new(s).unwrap()
    }

    fn gate(vcs: FakeVcs, markers: MemoryMarkerStore) -> CommitGate {
        CommitGate::new(Arc::new(vcs), Arc::new(markers), "master")
    }

    #[test]
    fn test_should_proceed_truth_table() {
        let a = marker("abc123");
        let b = marker("def456");
        assert!(!should_proceed(&a, Some(&a)));
        assert!(should_proceed(&a, Some(&b)));
        assert!(should_proceed(&a, None));
    }

    #[tokio::test]
    async fn test_same_head_is_noop() {
        let gate = gate(
            FakeVcs::with_head("abc123"),
            MemoryMarkerStore::with_marker("abc123"),
        );
        assert_eq!(gate.check_for_new_commit().await, None);
    }

    #[tokio::test]
    async fn test_new_head_proceeds() {
        let gate = gate(
            FakeVcs::with_head("def456"),
            MemoryMarkerStore::with_marker("abc123"),
        );
        assert_eq!(gate.check_for_new_commit().await, Some(marker("def456")));
    }

    #[tokio::test]
    async fn test_missing_marker_proceeds() {
        let gate = gate(FakeVcs::with_head("abc123"), MemoryMarkerStore::new());
        match gate.evaluate().await.unwrap() {
            GateDecision::Proceed { head, previous } => {
                assert_eq!(head, marker("abc123"));
                assert!(previous.is_none());
            }
            other => panic!("expected proceed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vcs_error_fails_closed() {
        let gate = gate(FakeVcs::failing("no such ref"), MemoryMarkerStore::new());
        assert!(gate.evaluate().await.is_err());
        assert_eq!(gate.check_for_new_commit().await, None);
    }

    #[tokio::test]
    async fn test_marker_error_fails_closed() {
        let gate = gate(FakeVcs::with_head("abc123"), MemoryMarkerStore::unreadable());
        assert_eq!(gate.check_for_new_commit().await, None);
    }

    #[tokio::test]
    async fn test_blank_head_fails_closed() {
        let gate = gate(FakeVcs::with_head("   "), MemoryMarkerStore::new());
        assert_eq!(gate.check_for_new_commit().await, None);
    }
}
