//! Integration tests for the compile-and-publish pipeline.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, SystemTime};

use chrono::DateTime;
use texpush_build::{CompileAndPublish, ScriptedRunner, ShellRunner};
use texpush_core::fakes::{FakeInspector, FakeVersionControl, VcsCall};
use texpush_core::{parse_line, AnalysisSource, GitAction, GitCli, RunConfig, RunLog, RunStatus};

fn log_lines(config: &RunConfig) -> Vec<String> {
    std::fs::read_to_string(config.log_path())
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Test: nothing to commit → skipped, SKIP, exactly one new log line
#[tokio::test]
async fn test_clean_tree_records_skip() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::in_dir(dir.path());
    let runner = ScriptedRunner::new("Output written on main.pdf (3 pages).\n", 0);
    let vcs = FakeVersionControl::clean();

    let outcome = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .expect("pipeline failed");

    assert_eq!(outcome.record.git_action, GitAction::Skipped);
    assert_eq!(outcome.record.commit_id, "SKIP");
    let lines = log_lines(&config);
    assert_eq!(lines.len(), 1);
    let entry = parse_line(&lines[0]).expect("log line parses");
    assert_eq!(entry.commit_id, "SKIP");
    assert_eq!(entry.git_action, Some(GitAction::Skipped));
}

/// Test: immediate second run with no file changes is skipped
#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::in_dir(dir.path());
    let runner = ScriptedRunner::new("", 0);
    let vcs = FakeVersionControl::dirty().with_upstream();
    let inspector = FakeInspector::unavailable();
    let pipeline = CompileAndPublish::new(&config, &runner, &vcs, &inspector).quiet();

    let first = pipeline.run().await.unwrap();
    let second = pipeline.run().await.unwrap();

    assert_eq!(first.record.git_action, GitAction::Pushed);
    assert_eq!(second.record.git_action, GitAction::Skipped);
    assert_eq!(vcs.commits().len(), 1);
    assert_eq!(log_lines(&config).len(), 2);
}

/// Test: a compiler log left over from an earlier build is not analyzed
#[tokio::test]
async fn test_stale_compiler_log_falls_back_to_capture() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("main.log");
    std::fs::write(
        &log,
        "LaTeX Warning: old\nLaTeX Warning: older\n! Undefined control sequence.\n",
    )
    .unwrap();
    std::fs::File::options()
        .write(true)
        .open(&log)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(24 * 60 * 60))
        .unwrap();
    let config = RunConfig::in_dir(dir.path());
    let runner = ScriptedRunner::new("sh: 1: bad option\n", 2);
    let vcs = FakeVersionControl::clean();

    let outcome = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.analysis.source, AnalysisSource::CapturedOutput);
    assert_eq!(outcome.record.warning_count, 0);
    assert_eq!(outcome.record.error_count, 0);
    assert_eq!(outcome.exit_code(), 2);
}

/// Test: disabled publishing with pending changes is not logged as skipped
#[tokio::test]
async fn test_no_publish_is_not_recorded_as_clean_tree() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        publish: false,
        ..RunConfig::in_dir(dir.path())
    };
    let runner = ScriptedRunner::new("", 0);
    let vcs = FakeVersionControl::dirty();

    let outcome = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.record.git_action, GitAction::NotPublished);
    let entry = parse_line(&log_lines(&config)[0]).unwrap();
    assert_eq!(entry.git_action, Some(GitAction::NotPublished));
    assert_eq!(entry.commit_id, "SKIP");
    assert!(vcs.calls().is_empty());
}

/// Test: the commit is stamped with the run's start time, not completion time
#[tokio::test]
async fn test_commit_uses_invocation_start_time() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::in_dir(dir.path());
    let start = DateTime::parse_from_rfc3339("2026-06-30T22:15:03+09:00").unwrap();
    let runner = ScriptedRunner::new("", 0).taking(340).started_at(start);
    let vcs = FakeVersionControl::dirty();

    let outcome = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.record.start_time, start);
    assert_eq!(outcome.record.duration_seconds, 340);
    assert_eq!(vcs.commits()[0].1, start);
    assert!(log_lines(&config)[0].starts_with("2026-06-30 22:15:03 | 340 | 0:05:40 | SUCCESS"));
}

/// Test: failed build still publishes and logs, and reports exit code 1
#[tokio::test]
async fn test_failed_build_still_publishes_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::in_dir(dir.path());
    let runner = ScriptedRunner::new("! LaTeX Error: File `missing.sty' not found.\n", 1)
        .with_stderr("Latexmk: Errors, so I did not complete making targets\n");
    let vcs = FakeVersionControl::dirty().on_branch("draft");

    let outcome = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(outcome.record.status, RunStatus::Failure);
    assert_eq!(outcome.record.error_count, 1);
    assert_eq!(outcome.record.git_action, GitAction::PushedNewUpstream);
    assert!(vcs.calls().contains(&VcsCall::Commit));

    let entry = parse_line(&log_lines(&config)[0]).unwrap();
    assert_eq!(entry.status, "FAILURE(1)");
    assert!(!entry.succeeded());

    let kept = outcome.kept_capture.expect("capture kept on failure");
    let text = std::fs::read_to_string(&kept).unwrap();
    assert!(text.contains("missing.sty"));
    std::fs::remove_file(kept).unwrap();
}

/// Test: push failure is non-fatal and recorded as push_failed
#[tokio::test]
async fn test_push_failure_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::in_dir(dir.path());
    let runner = ScriptedRunner::new("", 0);
    let vcs = FakeVersionControl::dirty().with_upstream().failing_push();

    let outcome = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.record.git_action, GitAction::PushFailed);
    assert_eq!(outcome.exit_code(), 0);
    assert!(log_lines(&config)[0].contains(" | push_failed | "));
}

/// Test: running average equals the mean of recorded durations, ignoring noise
#[tokio::test]
async fn test_running_average_over_runs_with_noise() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::in_dir(dir.path());
    std::fs::write(
        config.log_path(),
        "# build history\nnot | a | record\n2026-01-01 10:00:00 | ?? | broken\n",
    )
    .unwrap();
    let vcs = FakeVersionControl::clean();

    for secs in [4, 9, 20] {
        let runner = ScriptedRunner::new("", 0).taking(secs);
        CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
            .quiet()
            .run()
            .await
            .unwrap();
    }

    let summary = RunLog::new(config.log_path()).summarize(2).unwrap();
    assert_eq!(summary.runs_counted, 3);
    assert_eq!(summary.average_duration_seconds, Some(11.0));
    assert_eq!(summary.tail.len(), 2);
}

/// Test: a command that cannot be executed aborts without logging
#[tokio::test]
async fn test_command_not_found_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        command: "texpush-missing-compiler main.tex".to_string(),
        ..RunConfig::in_dir(dir.path())
    };
    let vcs = FakeVersionControl::dirty();

    let err = CompileAndPublish::new(&config, &ShellRunner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("command not found"));
    assert!(vcs.calls().is_empty());
    assert!(!config.log_path().exists());
}

/// Test: an unwritable run log is fatal even after publishing
#[tokio::test]
async fn test_unwritable_run_log_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        log_file: "no-such-dir/build_log.txt".into(),
        ..RunConfig::in_dir(dir.path())
    };
    let runner = ScriptedRunner::new("", 0);
    let vcs = FakeVersionControl::dirty();

    let err = CompileAndPublish::new(&config, &runner, &vcs, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("cannot append to run log"));
    assert_eq!(vcs.commits().len(), 1);
}

/// Test: end to end with a real shell command and a real git repository
#[tokio::test]
async fn test_end_to_end_with_git() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("paper");
    let remote = root.path().join("remote.git");
    std::fs::create_dir(&work).unwrap();
    std::fs::create_dir(&remote).unwrap();
    run_git(&remote, &["init", "--bare", "--initial-branch=main"]);
    run_git(&work, &["init", "--initial-branch=main"]);
    run_git(&work, &["config", "user.name", "test-user"]);
    run_git(&work, &["config", "user.email", "test@example.com"]);
    run_git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);

    let config = RunConfig {
        command: "printf 'LaTeX Warning: Label(s) may have changed.\\n' > main.log; \
                  printf '%%PDF-1.5 fake' > main.pdf; echo compiled"
            .to_string(),
        ..RunConfig::in_dir(&work)
    };
    let git = GitCli::new(&work);

    let outcome = CompileAndPublish::new(&config, &ShellRunner, &git, &FakeInspector::with_pages(2))
        .quiet()
        .run()
        .await
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.record.warning_count, 1);
    assert_eq!(outcome.record.git_action, GitAction::PushedNewUpstream);
    assert_eq!(
        outcome.analysis.produced_artifact.as_ref().map(|a| a.file_name()),
        Some("main.pdf".to_string())
    );

    let expected = outcome
        .record
        .start_time
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string();
    let dates = run_git(&work, &["log", "-1", "--format=%aI %cI"]);
    assert_eq!(dates, format!("{expected} {expected}"));

    // The run log is created after the commit, so the next run commits it.
    let again = CompileAndPublish::new(&config, &ShellRunner, &git, &FakeInspector::unavailable())
        .quiet()
        .run()
        .await
        .unwrap();
    assert_eq!(again.record.git_action, GitAction::Pushed);
    assert_eq!(log_lines(&config).len(), 2);
}
