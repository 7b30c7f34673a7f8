//! Git integration: the version-control collaborator used by the publisher.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::domain::error::{Result, TexpushError};

/// Version-control operations needed to publish a build.
pub trait VersionControl: Send + Sync {
    /// Stage every working-tree change, including new and deleted files.
    fn stage_all(&self) -> Result<()>;

    /// Whether the index differs from `HEAD`.
    fn has_staged_changes(&self) -> Result<bool>;

    /// Commit the index with author and committer dates forced to
    /// `timestamp`, bypassing hooks. Returns the abbreviated commit id.
    fn commit(&self, message: &str, timestamp: &DateTime<FixedOffset>) -> Result<String>;

    /// Current branch name, `None` when it cannot be determined.
    fn current_branch(&self) -> Option<String>;

    /// Whether the current branch tracks a remote branch.
    fn has_upstream(&self) -> bool;

    /// Push the current branch to its upstream.
    fn push(&self) -> Result<()>;

    /// Push `branch` to `remote` and record it as the upstream.
    fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<()>;
}

/// Format accepted by `GIT_AUTHOR_DATE`/`GIT_COMMITTER_DATE`: ISO-8601 with a
/// numeric UTC offset, to the second.
pub fn git_date(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// [`VersionControl`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| TexpushError::GitError(format!("failed to run git: {e}")))
    }

    fn git_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TexpushError::GitError(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VersionControl for GitCli {
    fn stage_all(&self) -> Result<()> {
        self.git_ok(&["add", "--all"]).map(|_| ())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let output = self.git(&["diff", "--cached", "--quiet"])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(TexpushError::GitError(format!(
                "git diff --cached failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    fn commit(&self, message: &str, timestamp: &DateTime<FixedOffset>) -> Result<String> {
        let date = git_date(timestamp);
        let output = Command::new("git")
            .args(["commit", "--no-verify", "--quiet", "-m", message])
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| TexpushError::GitError(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TexpushError::GitError(format!(
                "git commit failed: {}",
                stderr.trim()
            )));
        }

        self.git_ok(&["rev-parse", "--short", "HEAD"])
    }

    fn current_branch(&self) -> Option<String> {
        self.git_ok(&["symbolic-ref", "--quiet", "--short", "HEAD"])
            .ok()
            .filter(|b| !b.is_empty())
    }

    fn has_upstream(&self) -> bool {
        self.git(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn push(&self) -> Result<()> {
        self.git_ok(&["push", "--quiet"]).map(|_| ())
    }

    fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<()> {
        self.git_ok(&["push", "--quiet", "--set-upstream", remote, branch])
            .map(|_| ())
    }
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
