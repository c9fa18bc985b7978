//! Error taxonomy for the core crate.

use std::path::PathBuf;

/// Raised when a polling loop or automation run is cancelled from outside.
///
/// Not a failure: callers halt without reporting an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Errors from the version control collaborator.
#[derive(Debug, thiserror::Error)]
#[error("git error: {0}")]
pub struct VcsError(pub String);

/// Errors reading or writing the commit marker file.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    #[error("failed to read marker {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write marker {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while deciding whether a run should proceed.
///
/// The gate is fail-closed: callers treat any of these as "no work".
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Marker(#[from] MarkerError),
}

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
