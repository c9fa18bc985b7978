//! Git integration: remote head lookup, repository identity, push aliases.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::VcsError;

/// Read-only access to the tracked repository.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Resolve the current revision of the remote-tracking `branch`.
    async fn remote_head(&self, branch: &str) -> Result<String, VcsError>;
}

/// `Vcs` backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitVcs {
    repo_dir: PathBuf,
    remote: String,
}

impl GitVcs {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.into(),
        }
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn remote_head(&self, branch: &str) -> Result<String, VcsError> {
        let reference = format!("{}/{}", self.remote, branch);
        let output = tokio::process::Command::new("git")
            .args(["rev-parse", &reference])
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| VcsError(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError(format!(
                "git rev-parse {reference} failed: {}",
                stderr.trim()
            )));
        }

        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if sha.is_empty() {
            return Err(VcsError(format!(
                "git rev-parse {reference} returned empty output"
            )));
        }

        Ok(sha)
    }
}

/// URL of `remote` in the repository at `repo_dir`.
pub fn remote_url(repo_dir: &Path, remote: &str) -> Result<String, VcsError> {
    let output = Command::new("git")
        .args(["remote", "get-url", remote])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| VcsError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VcsError(format!(
            "git remote get-url {remote} failed: {}",
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether the repository's remote URL contains one of `expected` (case-insensitive).
///
/// An empty `expected` list accepts any repository.
pub fn verify_repository(repo_dir: &Path, remote: &str, expected: &[String]) -> bool {
    if expected.is_empty() {
        return true;
    }
    match remote_url(repo_dir, remote) {
        Ok(url) => url_matches(&url, expected),
        Err(_) => false,
    }
}

fn url_matches(url: &str, expected: &[String]) -> bool {
    let url = url.to_lowercase();
    expected
        .iter()
        .any(|identifier| url.contains(&identifier.to_lowercase()))
}

/// Alias for a plain push without automation.
pub const PUSH_ONLY_ALIAS: &str = "push-only";

/// Alias for a push followed by a confirmed pipeline run.
pub const PUSH_BUILD_ALIAS: &str = "push-build";

/// Install the `push-only` and `push-build` aliases into the repository config.
pub fn install_aliases(
    repo_dir: &Path,
    remote: &str,
    branch: &str,
    executable: &Path,
) -> Result<(), VcsError> {
    let push_only = format!("push {remote} {branch}");
    let push_build = format!(
        "!git push {remote} {branch} && \"{}\" run --confirm",
        executable.display()
    );
    git_config(repo_dir, &[&format!("alias.{PUSH_ONLY_ALIAS}"), &push_only])?;
    git_config(repo_dir, &[&format!("alias.{PUSH_BUILD_ALIAS}"), &push_build])?;
    Ok(())
}

/// Remove both aliases. Aliases that are not set are ignored.
pub fn remove_aliases(repo_dir: &Path) -> Result<(), VcsError> {
    for alias in [PUSH_ONLY_ALIAS, PUSH_BUILD_ALIAS] {
        let output = Command::new("git")
            .args(["config", "--unset", &format!("alias.{alias}")])
            .current_dir(repo_dir)
            .output()
            .map_err(|e| VcsError(format!("failed to run git: {e}")))?;
        // exit code 5: the key was not set
        match output.status.code() {
            Some(0) | Some(5) => {}
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(VcsError(format!(
                    "git config --unset alias.{alias} failed: {}",
                    stderr.trim()
                )));
            }
        }
    }
    Ok(())
}

fn git_config(repo_dir: &Path, args: &[&str]) -> Result<(), VcsError> {
    let output = Command::new("git")
        .arg("config")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| VcsError(format!("failed to run git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VcsError(format!("git config failed: {}", stderr.trim())));
    }
    Ok(())
}
