//! Run configuration, resolved once at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Build command used when none is configured.
pub const DEFAULT_COMMAND: &str = "latexmk -pdf -interaction=nonstopmode -file-line-error";

/// Run log file name, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "build_log.txt";

pub const DEFAULT_EXCERPT_LINES: usize = 25;

pub const DEFAULT_HISTORY_LINES: usize = 10;

pub const DEFAULT_REMOTE: &str = "origin";

/// Branch name used when the current checkout cannot be determined.
pub const DEFAULT_FALLBACK_BRANCH: &str = "main";

/// Substrings marking `.log` files that belong to the build driver's own
/// bookkeeping rather than to the compiled document.
pub const HOUSEKEEPING_LOG_MARKERS: &[&str] = &["latexmk", "missfont", "texput"];

/// Read-only parameters for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Shell command string to invoke.
    pub command: String,

    /// Directory the command runs in and where artifacts are discovered.
    pub work_dir: PathBuf,

    /// Append-only run log. Relative paths resolve against `work_dir`.
    pub log_file: PathBuf,

    /// Number of lines in the failure excerpt.
    pub excerpt_lines: usize,

    /// Print the whole filtered build output after a successful run.
    pub show_full_output: bool,

    /// Number of run log lines echoed after recording.
    pub history_lines: usize,

    /// Kill the command after this many seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,

    /// Remote used when the branch has no upstream yet.
    pub remote: String,

    pub fallback_branch: String,

    /// Persist the merged capture file when the build fails.
    pub keep_capture_on_failure: bool,

    /// Stage, commit and push after the build.
    pub publish: bool,

    /// Extension of the produced document (without dot).
    pub artifact_extension: String,

    /// Extension of the compiler's own log file (without dot).
    pub log_extension: String,

    pub housekeeping_markers: Vec<String>,

    /// Extra environment variables for the invoked command.
    pub env_overrides: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            work_dir: PathBuf::from("."),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            excerpt_lines: DEFAULT_EXCERPT_LINES,
            show_full_output: false,
            history_lines: DEFAULT_HISTORY_LINES,
            timeout_secs: None,
            remote: DEFAULT_REMOTE.to_string(),
            fallback_branch: DEFAULT_FALLBACK_BRANCH.to_string(),
            keep_capture_on_failure: true,
            publish: true,
            artifact_extension: "pdf".to_string(),
            log_extension: "log".to_string(),
            housekeeping_markers: HOUSEKEEPING_LOG_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            env_overrides: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Default configuration rooted at `work_dir`.
    pub fn in_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    /// The run log path, resolved against the working directory.
    pub fn log_path(&self) -> PathBuf {
        resolve(&self.work_dir, &self.log_file)
    }

    /// Whether a file name belongs to build-driver bookkeeping.
    pub fn is_housekeeping(&self, file_name: &str) -> bool {
        self.housekeeping_markers
            .iter()
            .any(|marker| file_name.contains(marker.as_str()))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
