//! Run records: one immutable summary per invocation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Commit id recorded when no commit was created.
pub const SKIPPED_COMMIT_ID: &str = "SKIP";

/// Outcome of the invoked build command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
    /// Killed after the configured timeout.
    TimedOut,
}

impl RunStatus {
    pub fn from_exit(exit_code: i32, timed_out: bool) -> Self {
        if timed_out {
            RunStatus::TimedOut
        } else if exit_code == 0 {
            RunStatus::Success
        } else {
            RunStatus::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

/// What the publisher did with the working tree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GitAction {
    /// Nothing was staged, no commit was made.
    Skipped,
    Pushed,
    /// Pushed and created the upstream tracking branch.
    PushedNewUpstream,
    /// Committed locally but the push was rejected or unreachable.
    PushFailed,
    /// Staging or committing itself failed.
    CommitFailed,
    /// Publishing was switched off; the repository was not inspected.
    NotPublished,
}

impl GitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitAction::Skipped => "skipped",
            GitAction::Pushed => "pushed",
            GitAction::PushedNewUpstream => "pushed_new_upstream",
            GitAction::PushFailed => "push_failed",
            GitAction::CommitFailed => "commit_failed",
            GitAction::NotPublished => "not_published",
        }
    }
}

impl fmt::Display for GitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GitAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skipped" => Ok(GitAction::Skipped),
            "pushed" => Ok(GitAction::Pushed),
            "pushed_new_upstream" => Ok(GitAction::PushedNewUpstream),
            "push_failed" => Ok(GitAction::PushFailed),
            "commit_failed" => Ok(GitAction::CommitFailed),
            "not_published" => Ok(GitAction::NotPublished),
            other => Err(format!("unknown git action: {other}")),
        }
    }
}

/// Summary of a single invocation, appended to the run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    /// When the build command was started (local time with offset).
    pub start_time: DateTime<FixedOffset>,

    /// Wall-clock duration in whole seconds.
    pub duration_seconds: u64,

    /// Exit code of the invoked command.
    pub exit_code: i32,

    pub status: RunStatus,

    /// Abbreviated commit hash, or [`SKIPPED_COMMIT_ID`].
    pub commit_id: String,

    pub git_action: GitAction,

    pub warning_count: usize,
    pub error_count: usize,
    pub overfull_count: usize,
    pub underfull_count: usize,

    /// The produced document, if one was found.
    pub output_artifact_path: Option<PathBuf>,

    /// The command string exactly as configured.
    pub command: String,
}

impl RunRecord {
    /// File name of the produced artifact, if any.
    pub fn artifact_name(&self) -> Option<String> {
        self.output_artifact_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}
