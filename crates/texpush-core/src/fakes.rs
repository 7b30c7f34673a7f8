//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `FakeVersionControl` and `FakeInspector`, which satisfy the
//! [`VersionControl`] and [`ArtifactInspector`] contracts without touching
//! git or external binaries.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset};

use crate::artifact::ArtifactInspector;
use crate::domain::error::{Result, TexpushError};
use crate::git::VersionControl;

// ---------------------------------------------------------------------------
// FakeVersionControl
// ---------------------------------------------------------------------------

/// A call made against [`FakeVersionControl`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    StageAll,
    HasStagedChanges,
    Commit,
    Push,
    PushSetUpstream { remote: String, branch: String },
}

#[derive(Debug, Default)]
struct FakeVcsState {
    dirty: bool,
    upstream: bool,
    calls: Vec<VcsCall>,
    commits: Vec<(String, DateTime<FixedOffset>)>,
}

/// Scripted repository: a dirty flag cleared by `commit`, an upstream flag
/// set by a successful `push_set_upstream`, and optional failures.
#[derive(Debug)]
pub struct FakeVersionControl {
    state: Mutex<FakeVcsState>,
    branch: Option<String>,
    fail_stage: bool,
    fail_push: bool,
}

impl FakeVersionControl {
    fn with_dirty(dirty: bool) -> Self {
        Self {
            state: Mutex::new(FakeVcsState {
                dirty,
                ..FakeVcsState::default()
            }),
            branch: Some("main".to_string()),
            fail_stage: false,
            fail_push: false,
        }
    }

    /// Nothing to commit.
    pub fn clean() -> Self {
        Self::with_dirty(false)
    }

    /// Pending working-tree changes.
    pub fn dirty() -> Self {
        Self::with_dirty(true)
    }

    pub fn with_upstream(self) -> Self {
        self.state.lock().unwrap().upstream = true;
        self
    }

    pub fn on_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    /// Branch detection fails.
    pub fn detached(mut self) -> Self {
        self.branch = None;
        self
    }

    pub fn failing_stage(mut self) -> Self {
        self.fail_stage = true;
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Simulate an edit to the working tree.
    pub fn touch(&self) {
        self.state.lock().unwrap().dirty = true;
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// `(message, timestamp)` of every commit made.
    pub fn commits(&self) -> Vec<(String, DateTime<FixedOffset>)> {
        self.state.lock().unwrap().commits.clone()
    }

    fn log(&self, call: VcsCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl VersionControl for FakeVersionControl {
    fn stage_all(&self) -> Result<()> {
        self.log(VcsCall::StageAll);
        if self.fail_stage {
            return Err(TexpushError::GitError("not a git repository".to_string()));
        }
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        self.log(VcsCall::HasStagedChanges);
        Ok(self.state.lock().unwrap().dirty)
    }

    fn commit(&self, message: &str, timestamp: &DateTime<FixedOffset>) -> Result<String> {
        self.log(VcsCall::Commit);
        let mut state = self.state.lock().unwrap();
        state.dirty = false;
        state.commits.push((message.to_string(), *timestamp));
        Ok(format!("c0ffee{}", state.commits.len()))
    }

    fn current_branch(&self) -> Option<String> {
        self.branch.clone()
    }

    fn has_upstream(&self) -> bool {
        self.state.lock().unwrap().upstream
    }

    fn push(&self) -> Result<()> {
        self.log(VcsCall::Push);
        if self.fail_push {
            return Err(TexpushError::GitError("remote rejected push".to_string()));
        }
        Ok(())
    }

    fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<()> {
        self.log(VcsCall::PushSetUpstream {
            remote: remote.to_string(),
            branch: branch.to_string(),
        });
        if self.fail_push {
            return Err(TexpushError::GitError(format!(
                "'{remote}' does not appear to be a git repository"
            )));
        }
        self.state.lock().unwrap().upstream = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeInspector
// ---------------------------------------------------------------------------

/// Inspector returning a fixed page count.
#[derive(Debug, Clone, Default)]
pub struct FakeInspector {
    pages: Option<u32>,
}

impl FakeInspector {
    pub fn with_pages(pages: u32) -> Self {
        Self { pages: Some(pages) }
    }

    /// Behaves like a missing inspector binary.
    pub fn unavailable() -> Self {
        Self { pages: None }
    }
}

impl ArtifactInspector for FakeInspector {
    fn page_count(&self, _path: &Path) -> Option<u32> {
        self.pages
    }
}
