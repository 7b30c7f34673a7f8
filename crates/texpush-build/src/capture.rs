//! Captured command output, backed by temporary files.
//!
//! Three files are kept per run: stdout, stderr and a merged view written by
//! both streams. They are deleted when the [`CapturedOutput`] is dropped,
//! unless [`CapturedOutput::keep`] persists the merged view.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

#[derive(Debug)]
pub struct CapturedOutput {
    stdout: NamedTempFile,
    stderr: NamedTempFile,
    merged: NamedTempFile,
}

fn capture_file(stream: &str) -> io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("texpush-{stream}-"))
        .suffix(".txt")
        .tempfile()
}

fn read_lossy(path: &Path) -> io::Result<String> {
    Ok(String::from_utf8_lossy(&std::fs::read(path)?).into_owned())
}

impl CapturedOutput {
    /// Empty capture files in the system temp directory.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            stdout: capture_file("stdout")?,
            stderr: capture_file("stderr")?,
            merged: capture_file("merged")?,
        })
    }

    /// Capture pre-filled with the given text; the merged view is stdout
    /// followed by stderr.
    pub fn from_text(stdout: &str, stderr: &str) -> io::Result<Self> {
        let mut captured = Self::new()?;
        captured.stdout.write_all(stdout.as_bytes())?;
        captured.stderr.write_all(stderr.as_bytes())?;
        captured.merged.write_all(stdout.as_bytes())?;
        captured.merged.write_all(stderr.as_bytes())?;
        Ok(captured)
    }

    /// Independent write handles for the stdout, stderr and merged files.
    pub fn writers(&self) -> io::Result<(std::fs::File, std::fs::File, std::fs::File)> {
        Ok((
            self.stdout.as_file().try_clone()?,
            self.stderr.as_file().try_clone()?,
            self.merged.as_file().try_clone()?,
        ))
    }

    pub fn stdout_text(&self) -> io::Result<String> {
        read_lossy(self.stdout.path())
    }

    pub fn stderr_text(&self) -> io::Result<String> {
        read_lossy(self.stderr.path())
    }

    pub fn merged_text(&self) -> io::Result<String> {
        read_lossy(self.merged.path())
    }

    pub fn merged_path(&self) -> &Path {
        self.merged.path()
    }

    /// Persist the merged view and return where it lives. The per-stream
    /// files are still removed.
    pub fn keep(self) -> io::Result<PathBuf> {
        let (_, path) = self.merged.keep().map_err(io::Error::from)?;
        Ok(path)
    }
}
