//! Produced-document discovery and read-only inspection.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The document the build produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProducedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Page count when an inspector could determine it.
    pub pages: Option<u32>,
}

impl ProducedArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Reads optional metadata out of a produced document.
pub trait ArtifactInspector: Send + Sync {
    /// Number of pages, or `None` when it cannot be determined.
    fn page_count(&self, path: &Path) -> Option<u32>;
}

/// Page counts via poppler's `pdfinfo`. A missing binary yields `None`.
#[derive(Debug, Clone)]
pub struct PdfInfoInspector {
    binary: String,
}

impl Default for PdfInfoInspector {
    fn default() -> Self {
        Self {
            binary: "pdfinfo".to_string(),
        }
    }
}

impl PdfInfoInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check whether the inspector binary can be executed at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-v")
            .output()
            .map(|_| true)
            .unwrap_or(false)
    }
}

impl ArtifactInspector for PdfInfoInspector {
    fn page_count(&self, path: &Path) -> Option<u32> {
        let output = match Command::new(&self.binary).arg(path).output() {
            Ok(output) => output,
            Err(e) => {
                debug!(binary = %self.binary, error = %e, "page inspector unavailable");
                return None;
            }
        };
        if !output.status.success() {
            debug!(path = %path.display(), "page inspector rejected file");
            return None;
        }
        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract the `Pages:` value from `pdfinfo` output.
pub fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Most recently modified regular file in `dir` with extension `ext`
/// (case-insensitive) that passes `keep`.
pub fn newest_file(dir: &Path, ext: &str, keep: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "cannot list directory");
            return None;
        }
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if !matches_ext || !keep(&path) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    newest.map(|(_, path)| path)
}

/// Locate the newest `*.{ext}` in `dir` and describe it.
pub fn discover_artifact(
    dir: &Path,
    ext: &str,
    inspector: &dyn ArtifactInspector,
) -> Option<ProducedArtifact> {
    let path = newest_file(dir, ext, |_| true)?;
    let size_bytes = std::fs::metadata(&path).map(|m| m.len()).ok()?;
    let pages = inspector.page_count(&path);
    Some(ProducedArtifact {
        path,
        size_bytes,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeInspector;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, contents: &[u8], modified: SystemTime) {
        std::fs::write(path, contents).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[test]
    fn test_discover_picks_newest_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(600);
        touch(&dir.path().join("report-v1.pdf"), b"%PDF-old", base);
        touch(
            &dir.path().join("report-v2.pdf"),
            b"%PDF-newer",
            base + Duration::from_secs(60),
        );
        touch(
            &dir.path().join("notes.txt"),
            b"newest but wrong type",
            base + Duration::from_secs(120),
        );

        let artifact = discover_artifact(dir.path(), "pdf", &FakeInspector::with_pages(7)).unwrap();
        assert_eq!(artifact.file_name(), "report-v2.pdf");
        assert_eq!(artifact.size_bytes, 10);
        assert_eq!(artifact.pages, Some(7));
    }

    #[test]
    fn test_discover_without_inspector_reports_size_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper.pdf"), b"12345").unwrap();

        let artifact = discover_artifact(dir.path(), "pdf", &FakeInspector::unavailable()).unwrap();
        assert_eq!(artifact.size_bytes, 5);
        assert_eq!(artifact.pages, None);
    }

    #[test]
    fn test_discover_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_artifact(dir.path(), "pdf", &FakeInspector::unavailable()).is_none());
    }

    #[test]
    fn test_missing_pdfinfo_binary_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let inspector = PdfInfoInspector::with_binary("definitely-not-a-real-pdfinfo-binary");
        assert!(!inspector.is_available());
        assert_eq!(inspector.page_count(&pdf), None);
    }

    #[test]
    fn test_parse_pdfinfo_pages() {
        let stdout = "Title:          Thesis\nProducer:       pdfTeX-1.40.25\nPages:          142\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_pages(stdout), Some(142));
        assert_eq!(parse_pdfinfo_pages("Title: x\n"), None);
        assert_eq!(parse_pdfinfo_pages("Pages: many\n"), None);
    }
}
