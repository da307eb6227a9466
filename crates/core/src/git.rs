//! Git metadata of the role source
//!
//! Collected for the report footer. Everything here is best-effort: a missing git
//! binary or a source outside a repository leaves the fields empty.

use crate::errors::GitError;
use crate::process::{find_executable, OutputMode, ProcessExecutor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repository state of the role source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitMetadata {
    /// URL of the `origin` remote
    pub repository: String,
    pub commit_hash: String,
    /// Uncommitted changes are present
    pub local_changes: bool,
}

impl GitMetadata {
    /// Whether any repository information was found
    pub fn is_repository(&self) -> bool {
        !self.commit_hash.is_empty()
    }
}

/// Runs git queries in one directory
pub struct GitProbe<'a, E> {
    executor: &'a E,
    git: PathBuf,
}

impl<'a, E: ProcessExecutor> GitProbe<'a, E> {
    /// Probe using `git` from `$PATH`
    pub fn discover(executor: &'a E) -> Result<Self, GitError> {
        let git = find_executable("git").ok_or(GitError::NotInstalled)?;
        Ok(Self::new(executor, git))
    }

    pub fn new(executor: &'a E, git: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            git: git.into(),
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let mut full = vec!["-C".to_string(), dir.display().to_string()];
        full.extend(args.iter().map(|s| s.to_string()));

        self.executor
            .execute(&self.git, &full, OutputMode::Capture)
            .await
            .map(|output| output.stdout.trim().to_string())
            .map_err(|err| GitError::CLIError(err.to_string()))
    }

    /// Collect metadata for `dir`; failures leave fields empty
    pub async fn collect(&self, dir: &Path) -> GitMetadata {
        let commit_hash = match self.git(dir, &["rev-parse", "HEAD"]).await {
            Ok(commit) => commit,
            Err(err) => {
                debug!("{} is not a git checkout: {}", dir.display(), err);
                return GitMetadata::default();
            }
        };

        let repository = self
            .git(dir, &["ls-remote", "--get-url", "origin"])
            .await
            .unwrap_or_default();
        let local_changes = self
            .git(dir, &["status", "--porcelain"])
            .await
            .map(|status| !status.is_empty())
            .unwrap_or(false);

        GitMetadata {
            repository,
            commit_hash,
            local_changes,
        }
    }
}

/// Collect git metadata with `git` from `$PATH`
pub async fn collect<E: ProcessExecutor>(executor: &E, dir: &Path) -> GitMetadata {
    match GitProbe::discover(executor) {
        Ok(probe) => probe.collect(dir).await,
        Err(err) => {
            debug!("Skipping git metadata: {}", err);
            GitMetadata::default()
        }
    }
}
