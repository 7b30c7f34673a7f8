//! Human-readable run reports.

use std::fmt::Write as _;
use std::path::Path;

use texpush_core::{
    format_hms, AnalysisSource, GitAction, Palette, Role, RunConfig, RunLogSummary, RunStatus,
};

use crate::pipeline::RunOutcome;

/// Format a byte count with binary units, one decimal above bytes.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn source_label(source: &AnalysisSource) -> String {
    match source {
        AnalysisSource::LogFile(path) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        AnalysisSource::CapturedOutput => "captured output".to_string(),
    }
}

fn section(out: &mut String, palette: &Palette, title: &str, lines: &[String]) {
    let _ = writeln!(out, "{}", palette.paint(&format!("--- {title} ---"), Role::Heading));
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
}

/// Render the post-run report: banner, counts, artifact, excerpt, publish
/// outcome and history.
pub fn render_report(outcome: &RunOutcome, config: &RunConfig, palette: &Palette) -> String {
    let record = &outcome.record;
    let analysis = &outcome.analysis;
    let mut out = String::new();

    let elapsed = format!(
        "{} ({}s)",
        format_hms(record.duration_seconds),
        record.duration_seconds
    );
    let banner = match record.status {
        RunStatus::Success => palette.paint(&format!("BUILD SUCCEEDED in {elapsed}"), Role::Success),
        RunStatus::Failure => palette.paint(
            &format!("BUILD FAILED (exit {}) after {elapsed}", record.exit_code),
            Role::Failure,
        ),
        RunStatus::TimedOut => palette.paint(&format!("BUILD TIMED OUT after {elapsed}"), Role::Failure),
    };
    let _ = writeln!(out, "{banner}");

    let counts = format!(
        "Warnings: {}  Errors: {}  Overfull: {}  Underfull: {}",
        record.warning_count, record.error_count, record.overfull_count, record.underfull_count
    );
    let role = if record.error_count > 0 {
        Role::Failure
    } else if record.warning_count > 0 {
        Role::Warning
    } else {
        Role::Success
    };
    let _ = writeln!(
        out,
        "{}  {}",
        palette.paint(&counts, role),
        palette.paint(&format!("[from {}]", source_label(&analysis.source)), Role::Muted)
    );

    if !analysis.overfull_examples.is_empty() {
        section(&mut out, palette, "overfull boxes", &analysis.overfull_examples);
    }
    if !analysis.underfull_examples.is_empty() {
        section(&mut out, palette, "underfull boxes", &analysis.underfull_examples);
    }

    match &analysis.produced_artifact {
        Some(artifact) => {
            let pages = artifact
                .pages
                .map(|p| format!(", {p} pages"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "Output: {} ({}{pages})",
                artifact.file_name(),
                format_size(artifact.size_bytes)
            );
        }
        None => {
            let _ = writeln!(
                out,
                "{}",
                palette.paint(
                    &format!("Output: no .{} file found", config.artifact_extension),
                    Role::Warning
                )
            );
        }
    }

    if record.status.is_success() && config.show_full_output {
        section(&mut out, palette, "full output", &analysis.filtered_output);
    } else if !record.status.is_success() || record.error_count > 0 {
        let title = format!(
            "last {} lines of {}",
            analysis.excerpt.len(),
            source_label(&analysis.source)
        );
        section(&mut out, palette, &title, &analysis.excerpt);
    }

    let publish = &outcome.publish;
    let git_line = match publish.action {
        GitAction::Skipped => palette.paint("Git: nothing to commit", Role::Muted),
        GitAction::NotPublished => palette.paint("Git: publishing disabled", Role::Muted),
        GitAction::Pushed => palette.paint(&format!("Git: pushed {}", publish.commit_id), Role::Success),
        GitAction::PushedNewUpstream => palette.paint(
            &format!(
                "Git: pushed {} (upstream set to {})",
                publish.commit_id, config.remote
            ),
            Role::Success,
        ),
        GitAction::PushFailed => palette.paint(
            &format!(
                "Git: committed {} but push failed: {}",
                publish.commit_id,
                publish.detail.as_deref().unwrap_or("unknown error")
            ),
            Role::Warning,
        ),
        GitAction::CommitFailed => palette.paint(
            &format!(
                "Git: commit failed: {}",
                publish.detail.as_deref().unwrap_or("unknown error")
            ),
            Role::Warning,
        ),
    };
    let _ = writeln!(out, "{git_line}");

    if let Some(path) = &outcome.kept_capture {
        let _ = writeln!(out, "Captured output kept at {}", path.display());
    }

    out.push_str(&render_history(&outcome.summary, &config.log_path(), palette));
    out
}

/// Render the run log tail and running average.
pub fn render_history(summary: &RunLogSummary, log_path: &Path, palette: &Palette) -> String {
    let mut out = String::new();
    let name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| log_path.display().to_string());
    section(
        &mut out,
        palette,
        &format!("last {} runs ({name})", summary.tail.len()),
        &summary.tail,
    );
    match summary.average_duration_seconds {
        Some(avg) => {
            let _ = writeln!(
                out,
                "Average duration: {} ({avg:.1}s over {} runs)",
                format_hms(avg.round() as u64),
                summary.runs_counted
            );
        }
        None => {
            let _ = writeln!(out, "{}", palette.paint("No recorded runs yet", Role::Muted));
        }
    }
    out
}
