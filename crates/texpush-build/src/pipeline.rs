//! The compile-and-publish pipeline.
//!
//! Strictly sequential: invoke → analyze → publish → record. Publishing and
//! recording happen whatever the build outcome; only a command that cannot be
//! started or a run log that cannot be written aborts the run.

use std::path::PathBuf;
use std::time::SystemTime;

use anyhow::Context;
use tracing::{info, warn};

use texpush_core::{
    analyze, publish, AnalysisResult, ArtifactInspector, PublishResult, RunConfig, RunLog,
    RunLogSummary, RunRecord, RunStatus, VersionControl,
};

use crate::runner::{CommandRunner, InvokeRequest};

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,
    pub analysis: AnalysisResult,
    pub publish: PublishResult,
    /// History tail and running average, read back after recording.
    pub summary: RunLogSummary,
    /// Persisted merged capture of a failed run.
    pub kept_capture: Option<PathBuf>,
}

impl RunOutcome {
    /// The process exit code to report: the build command's own.
    pub fn exit_code(&self) -> i32 {
        self.record.exit_code
    }

    pub fn succeeded(&self) -> bool {
        self.record.status.is_success()
    }
}

/// Pipeline orchestrator wired to its collaborators.
pub struct CompileAndPublish<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    vcs: &'a dyn VersionControl,
    inspector: &'a dyn ArtifactInspector,
    echo: bool,
}

impl<'a> CompileAndPublish<'a> {
    pub fn new(
        config: &'a RunConfig,
        runner: &'a dyn CommandRunner,
        vcs: &'a dyn VersionControl,
        inspector: &'a dyn ArtifactInspector,
    ) -> Self {
        Self {
            config,
            runner,
            vcs,
            inspector,
            echo: true,
        }
    }

    /// Do not mirror the command's output to the console.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Run the whole pipeline once.
    pub async fn run(&self) -> anyhow::Result<RunOutcome> {
        let config = self.config;

        // Invoke
        let mut request = InvokeRequest::from_config(config);
        request.echo = self.echo;
        let invocation = self
            .runner
            .run(&request)
            .await
            .with_context(|| format!("Failed to execute build command `{}`", config.command))?;
        let status = RunStatus::from_exit(invocation.exit_code, invocation.timed_out);

        // Analyze
        let captured = invocation.captured.merged_text().unwrap_or_else(|e| {
            warn!(error = %e, "captured output unreadable");
            String::new()
        });
        let analysis = analyze(
            &captured,
            config,
            self.inspector,
            SystemTime::from(invocation.start_time),
        );

        // Publish
        let publish = if config.publish {
            publish(
                self.vcs,
                &invocation.start_time,
                &config.remote,
                &config.fallback_branch,
            )
        } else {
            info!("publishing disabled");
            PublishResult::disabled()
        };

        // Record
        let record = RunRecord {
            start_time: invocation.start_time,
            duration_seconds: invocation.duration_seconds,
            exit_code: invocation.exit_code,
            status,
            commit_id: publish.commit_id.clone(),
            git_action: publish.action,
            warning_count: analysis.warning_count,
            error_count: analysis.error_count,
            overfull_count: analysis.overfull_count,
            underfull_count: analysis.underfull_count,
            output_artifact_path: analysis.produced_artifact_path().cloned(),
            command: config.command.clone(),
        };
        let log = RunLog::new(config.log_path());
        log.append(&record)
            .with_context(|| format!("Failed to record run in {}", log.path().display()))?;

        let summary = log.summarize(config.history_lines).unwrap_or_else(|e| {
            warn!(error = %e, "cannot read run log back");
            RunLogSummary::default()
        });

        let kept_capture = if !status.is_success() && config.keep_capture_on_failure {
            match invocation.captured.keep() {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "cannot keep captured output");
                    None
                }
            }
        } else {
            None
        };

        Ok(RunOutcome {
            record,
            analysis,
            publish,
            summary,
            kept_capture,
        })
    }
}
