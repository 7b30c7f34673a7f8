//! Publisher: stage, commit at the run's start time, push.
//!
//! Every failure here is reported through [`GitAction`] rather than returned;
//! a broken remote must never stop the run from being recorded.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{GitAction, SKIPPED_COMMIT_ID};
use crate::git::VersionControl;

/// What was published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishResult {
    pub action: GitAction,
    /// Abbreviated id of the new commit, or `SKIP`.
    pub commit_id: String,
    /// Error text for `push_failed`/`commit_failed`.
    pub detail: Option<String>,
}

impl PublishResult {
    fn without_commit(action: GitAction, detail: Option<String>) -> Self {
        Self {
            action,
            commit_id: SKIPPED_COMMIT_ID.to_string(),
            detail,
        }
    }

    /// The result used when publishing is switched off.
    pub fn disabled() -> Self {
        Self::without_commit(GitAction::NotPublished, None)
    }
}

/// Commit message for a run started at `start`.
pub fn commit_message(start: &DateTime<FixedOffset>) -> String {
    format!("Automated build {}", start.format("%Y-%m-%d %H:%M:%S"))
}

/// Stage everything and, if anything is staged, commit and push it.
pub fn publish(
    vcs: &dyn VersionControl,
    run_start: &DateTime<FixedOffset>,
    remote: &str,
    fallback_branch: &str,
) -> PublishResult {
    if let Err(e) = vcs.stage_all() {
        warn!(error = %e, "staging failed");
        return PublishResult::without_commit(GitAction::CommitFailed, Some(e.to_string()));
    }

    match vcs.has_staged_changes() {
        Ok(false) => {
            info!("nothing to commit");
            return PublishResult::without_commit(GitAction::Skipped, None);
        }
        Ok(true) => {}
        Err(e) => {
            warn!(error = %e, "cannot inspect staged changes");
            return PublishResult::without_commit(GitAction::CommitFailed, Some(e.to_string()));
        }
    }

    let commit_id = match vcs.commit(&commit_message(run_start), run_start) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "commit failed");
            return PublishResult::without_commit(GitAction::CommitFailed, Some(e.to_string()));
        }
    };
    info!(commit = %commit_id, "committed");

    let (pushed, action) = if vcs.has_upstream() {
        (vcs.push(), GitAction::Pushed)
    } else {
        let branch = vcs
            .current_branch()
            .unwrap_or_else(|| fallback_branch.to_string());
        info!(remote = %remote, branch = %branch, "setting upstream");
        (
            vcs.push_set_upstream(remote, &branch),
            GitAction::PushedNewUpstream,
        )
    };

    match pushed {
        Ok(()) => PublishResult {
            action,
            commit_id,
            detail: None,
        },
        Err(e) => {
            warn!(error = %e, "push failed");
            PublishResult {
                action: GitAction::PushFailed,
                commit_id,
                detail: Some(e.to_string()),
            }
        }
    }
}
