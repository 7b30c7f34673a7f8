//! texpush Core Library
//!
//! Building blocks for the compile-and-publish workflow: classifying build
//! output, locating the produced document, committing and pushing the working
//! tree, and keeping the append-only run history.

pub mod analyzer;
pub mod artifact;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod publisher;
pub mod recorder;
pub mod style;
pub mod telemetry;

pub use analyzer::{
    analyze, analyze_with, excerpt, filter_boilerplate, select_source, AnalysisResult,
    AnalysisSource, Category, ClassificationRule, LineCounts, RuleSet, MAX_BOX_EXAMPLES,
};

pub use artifact::{discover_artifact, ArtifactInspector, PdfInfoInspector, ProducedArtifact};

pub use domain::{
    GitAction, Result, RunConfig, RunRecord, RunStatus, TexpushError, SKIPPED_COMMIT_ID,
};

pub use git::{git_date, is_git_repo, GitCli, VersionControl};

pub use publisher::{commit_message, publish, PublishResult};

pub use recorder::{format_hms, format_line, parse_line, RunLog, RunLogEntry, RunLogSummary};

pub use style::{Palette, Role};

pub use telemetry::init_tracing;
