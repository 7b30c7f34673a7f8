//! Recorder: the append-only, one-line-per-run history file.
//!
//! Line layout (fields separated by ` | `):
//!
//! ```text
//! 2026-03-01 09:30:00 | 42 | 0:00:42 | SUCCESS | 1a2b3c4 | pushed | W:3 | E:0 | main.pdf | latexmk -pdf
//! ```
//!
//! timestamp, duration seconds, duration H:MM:SS, status, commit id, git
//! action, warning count, error count, artifact name (`-` when none), command.
//! Pipes, backslashes and control characters inside free-form fields are
//! backslash-escaped so every record stays on one line.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::error::{Result, TexpushError};
use crate::domain::{GitAction, RunRecord, RunStatus};

const SEPARATOR: &str = " | ";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FIELD_COUNT: usize = 10;

/// A parsed run log line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunLogEntry {
    pub timestamp: NaiveDateTime,
    pub duration_seconds: u64,
    /// `SUCCESS`, `FAILURE(<code>)` or `TIMEOUT`.
    pub status: String,
    pub commit_id: String,
    pub git_action: Option<GitAction>,
    pub warning_count: usize,
    pub error_count: usize,
    pub artifact: Option<String>,
    pub command: String,
}

impl RunLogEntry {
    pub fn succeeded(&self) -> bool {
        self.status == "SUCCESS"
    }
}

/// Tail and running average after a run has been recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunLogSummary {
    /// The last lines of the file, verbatim.
    pub tail: Vec<String>,
    /// Mean of every parsable duration in the file.
    pub average_duration_seconds: Option<f64>,
    /// Number of lines that contributed to the average.
    pub runs_counted: usize,
}

/// Format seconds as `H:MM:SS`.
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

fn status_field(record: &RunRecord) -> String {
    match record.status {
        RunStatus::Success => "SUCCESS".to_string(),
        RunStatus::Failure => format!("FAILURE({})", record.exit_code),
        RunStatus::TimedOut => "TIMEOUT".to_string(),
    }
}

/// Escape a free-form field so it contains no separator or line break.
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape_field`]. Unknown escapes are kept literally.
pub fn unescape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('|') => out.push('|'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 2 => out.push(decoded),
                    _ => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split a line on unescaped pipes, dropping the single space either side of
/// each separator, and unescape every field.
fn split_fields(line: &str) -> Vec<String> {
    let mut raw = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' => raw.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    raw.push(current);

    let last = raw.len() - 1;
    raw.iter()
        .enumerate()
        .map(|(i, field)| {
            let mut field = field.as_str();
            if i > 0 {
                field = field.strip_prefix(' ').unwrap_or(field);
            }
            if i < last {
                field = field.strip_suffix(' ').unwrap_or(field);
            }
            unescape_field(field)
        })
        .collect()
}

/// Render a record as a single log line (without the newline).
pub fn format_line(record: &RunRecord) -> String {
    let artifact = record
        .artifact_name()
        .map(|name| escape_field(&name))
        .unwrap_or_else(|| "-".to_string());
    [
        record.start_time.format(TIMESTAMP_FORMAT).to_string(),
        record.duration_seconds.to_string(),
        format_hms(record.duration_seconds),
        status_field(record),
        escape_field(&record.commit_id),
        record.git_action.to_string(),
        format!("W:{}", record.warning_count),
        format!("E:{}", record.error_count),
        artifact,
        escape_field(&record.command),
    ]
    .join(SEPARATOR)
}

/// Timestamp and duration of a line, if both are well-formed.
fn parse_duration(fields: &[String]) -> Option<u64> {
    if fields.len() < 2 {
        return None;
    }
    NaiveDateTime::parse_from_str(&fields[0], TIMESTAMP_FORMAT).ok()?;
    fields[1].trim().parse().ok()
}

/// Parse a full log line. Returns `None` for anything malformed.
pub fn parse_line(line: &str) -> Option<RunLogEntry> {
    let fields = split_fields(line);
    if fields.len() != FIELD_COUNT {
        return None;
    }
    let count = |field: &str, prefix: &str| -> Option<usize> {
        field.strip_prefix(prefix)?.parse().ok()
    };
    Some(RunLogEntry {
        timestamp: NaiveDateTime::parse_from_str(&fields[0], TIMESTAMP_FORMAT).ok()?,
        duration_seconds: fields[1].parse().ok()?,
        status: fields[3].clone(),
        commit_id: fields[4].clone(),
        git_action: fields[5].parse().ok(),
        warning_count: count(&fields[6], "W:")?,
        error_count: count(&fields[7], "E:")?,
        artifact: Some(fields[8].clone()).filter(|a| a != "-"),
        command: fields[9].clone(),
    })
}

/// The run log file.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append exactly one line for `record`, creating the file if needed.
    pub fn append(&self, record: &RunRecord) -> Result<()> {
        let mut line = format_line(record);
        line.push('\n');

        let write_err = |source| TexpushError::LogWrite {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).map_err(write_err)?;

        info!(log = %self.path.display(), "run recorded");
        Ok(())
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Last `window` lines plus the mean duration over the whole file.
    /// Lines without a parsable timestamp and duration are skipped.
    pub fn summarize(&self, window: usize) -> Result<RunLogSummary> {
        let lines = self.read_lines()?;

        let durations: Vec<u64> = lines
            .iter()
            .filter_map(|line| parse_duration(&split_fields(line)))
            .collect();
        let skipped = lines.len() - durations.len();
        if skipped > 0 {
            debug!(skipped, "ignored unparsable run log lines");
        }

        let average_duration_seconds = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
        };

        let start = lines.len().saturating_sub(window);
        Ok(RunLogSummary {
            tail: lines[start..].to_vec(),
            average_duration_seconds,
            runs_counted: durations.len(),
        })
    }

    /// Every well-formed record in file order.
    pub fn entries(&self) -> Result<Vec<RunLogEntry>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| parse_line(line))
            .collect())
    }
}
