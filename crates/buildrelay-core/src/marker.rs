//! Persistence for the commit marker.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{CommitMarker, MarkerError};

/// Storage for the single durable value: the last processed revision.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Read the marker. `None` means no prior run.
    async fn load(&self) -> Result<Option<CommitMarker>, MarkerError>;

    /// Replace the marker.
    async fn store(&self, marker: &CommitMarker) -> Result<(), MarkerError>;
}

/// Marker kept in a single text file.
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    path: PathBuf,
}

impl FileMarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MarkerStore for FileMarkerStore {
    async fn load(&self) -> Result<Option<CommitMarker>, MarkerError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(CommitMarker::new(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(MarkerError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn store(&self, marker: &CommitMarker) -> Result<(), MarkerError> {
        // Write then rename; readers never see a partial marker.
        let tmp = self.temp_path();
        let write_err = |source| MarkerError::Write {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, marker.as_str())
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::new(dir.path().join("marker"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::new(dir.path().join("marker"));
        let marker = CommitMarker::new("abc123").unwrap();

        store.store(&marker).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(marker));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        std::fs::write(&path, "\n").unwrap();
        let store = FileMarkerStore::new(path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMarkerStore::new(dir.path().join("nope").join("marker"));
        let err = store
            .store(&CommitMarker::new("abc").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MarkerError::Write { .. }));
    }
}
