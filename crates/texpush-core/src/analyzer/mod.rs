//! Build output analysis.
//!
//! Picks the richest available source (the compiler's own `.log` file when
//! one exists, otherwise the captured terminal output), tallies diagnostics
//! with the [`RuleSet`], finds the produced document, and cuts an excerpt.

pub mod excerpt;
pub mod rules;

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::{discover_artifact, newest_file, ArtifactInspector, ProducedArtifact};
use crate::domain::RunConfig;

pub use excerpt::{excerpt, filter_boilerplate};
pub use rules::{Category, ClassificationRule, LineCounts, RuleSet, MAX_BOX_EXAMPLES};

/// Where the analyzed text came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum AnalysisSource {
    /// The compiler's log file.
    LogFile(PathBuf),
    /// The combined stdout/stderr capture.
    CapturedOutput,
}

/// Counts, examples and excerpt for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub source: AnalysisSource,
    pub warning_count: usize,
    pub error_count: usize,
    pub overfull_count: usize,
    pub underfull_count: usize,
    pub overfull_examples: Vec<String>,
    pub underfull_examples: Vec<String>,
    pub produced_artifact: Option<ProducedArtifact>,
    /// Tail of the analyzed source with boilerplate removed.
    pub excerpt: Vec<String>,
    /// Every content-bearing line of the analyzed source.
    #[serde(skip)]
    pub filtered_output: Vec<String>,
}

impl AnalysisResult {
    pub fn produced_artifact_path(&self) -> Option<&PathBuf> {
        self.produced_artifact.as_ref().map(|a| &a.path)
    }

    pub fn produced_artifact_size(&self) -> Option<u64> {
        self.produced_artifact.as_ref().map(|a| a.size_bytes)
    }
}

/// Choose the text to analyze.
///
/// The newest non-empty `*.{log_extension}` in the working directory wins,
/// skipping housekeeping logs and the run log itself, provided it was written
/// no earlier than `run_start` (compared in whole seconds). Falls back to
/// `captured` when there is none, it is stale, or it cannot be read.
pub fn select_source(
    config: &RunConfig,
    captured: &str,
    run_start: SystemTime,
) -> (AnalysisSource, String) {
    let run_log = config.log_path();
    let candidate = newest_file(&config.work_dir, &config.log_extension, |path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        !config.is_housekeeping(&name) && !same_file(path, &run_log)
    });

    if let Some(path) = candidate {
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) if !written_since(modified, run_start) => {
                debug!(log = %path.display(), "compiler log predates this run");
                return (AnalysisSource::CapturedOutput, captured.to_string());
            }
            Ok(_) => {}
            Err(e) => {
                debug!(log = %path.display(), error = %e, "cannot stat compiler log");
                return (AnalysisSource::CapturedOutput, captured.to_string());
            }
        }
        match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(log = %path.display(), "analyzing compiler log");
                let text = String::from_utf8_lossy(&bytes).into_owned();
                return (AnalysisSource::LogFile(path), text);
            }
            Ok(_) => debug!(log = %path.display(), "compiler log is empty"),
            Err(e) => debug!(log = %path.display(), error = %e, "cannot read compiler log"),
        }
    }

    (AnalysisSource::CapturedOutput, captured.to_string())
}

fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Filesystem timestamps may be coarser than the clock, so only whole
/// seconds are compared.
fn written_since(modified: SystemTime, run_start: SystemTime) -> bool {
    epoch_secs(modified) >= epoch_secs(run_start)
}

fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Analyze one run using the built-in LaTeX rules.
pub fn analyze(
    captured: &str,
    config: &RunConfig,
    inspector: &dyn ArtifactInspector,
    run_start: SystemTime,
) -> AnalysisResult {
    analyze_with(RuleSet::latex(), captured, config, inspector, run_start)
}

/// Analyze one run with a caller-supplied rule table.
pub fn analyze_with(
    rules: &RuleSet,
    captured: &str,
    config: &RunConfig,
    inspector: &dyn ArtifactInspector,
    run_start: SystemTime,
) -> AnalysisResult {
    let (source, text) = select_source(config, captured, run_start);
    let counts = rules.count(&text);
    let filtered_output = filter_boilerplate(&text);
    let tail = excerpt(&text, config.excerpt_lines);
    let produced_artifact =
        discover_artifact(&config.work_dir, &config.artifact_extension, inspector);

    info!(
        warnings = counts.warnings,
        errors = counts.errors,
        overfull = counts.overfull,
        underfull = counts.underfull,
        "analysis complete"
    );

    AnalysisResult {
        source,
        warning_count: counts.warnings,
        error_count: counts.errors,
        overfull_count: counts.overfull,
        underfull_count: counts.underfull,
        overfull_examples: counts.overfull_examples,
        underfull_examples: counts.underfull_examples,
        produced_artifact,
        excerpt: tail,
        filtered_output,
    }
}
