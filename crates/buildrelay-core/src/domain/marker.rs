//! Commit marker: the persisted pointer to the last processed revision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of characters shown when a revision is abbreviated.
const SHORT_LEN: usize = 8;

/// An opaque revision identifier.
///
/// Used both for the remote branch tip and for the persisted marker. The value
/// is trimmed on construction so markers read from disk compare equal to
/// revisions parsed from git output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitMarker(String);

impl CommitMarker {
    /// Create a marker from a revision string. Returns `None` for blank input.
    pub fn new(revision: impl AsRef<str>) -> Option<Self> {
        let trimmed = revision.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The full revision string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated revision for display.
    pub fn short(&self) -> &str {
        self.0
            .char_indices()
            .nth(SHORT_LEN)
            .map(|(idx, _)| &self.0[..idx])
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_whitespace() {
        let marker = CommitMarker::new("  abc123\n").unwrap();
        assert_eq!(marker.as_str(), "abc123");
    }

    #[test]
    fn test_blank_is_none() {
        assert!(CommitMarker::new("").is_none());
        assert!(CommitMarker::new(" \n\t").is_none());
    }

    #[test]
    fn test_short() {
        let marker = CommitMarker::new("0123456789abcdef").unwrap();
        assert_eq!(marker.short(), "01234567");

        let tiny = CommitMarker::new("abc").unwrap();
        assert_eq!(tiny.short(), "abc");
    }
}
