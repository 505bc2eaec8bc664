//! Local file system documents: plain text read directly, PDFs via `pdftotext`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::InputError;
use crate::models::Document;
use crate::utils::file::{is_pdf_file, is_text_file, read_file_content};

pub const PDFTOTEXT_INSTALL_HINT: &str =
    "Install poppler-utils (Debian/Ubuntu) or poppler (Homebrew) to get pdftotext";

/// Form feed emitted by `pdftotext` between pages.
const PAGE_BREAK: char = '\u{c}';

/// Documents loaded from a set of paths, plus the files that could not be read.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<(PathBuf, InputError)>,
}

/// Loads documents from files and directories.
#[derive(Debug, Clone)]
pub struct LocalSource {
    max_file_size: u64,
}

impl LocalSource {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Expand `paths` into the files to load. Directories are walked recursively.
    pub fn collect_files(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for root in paths {
            // Missing paths are kept so loading reports them
            if root.is_file() || !root.exists() {
                files.push(root.clone());
                continue;
            }

            for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable path");
                        continue;
                    }
                };
                let path = entry.path();
                if path.is_file() && (is_pdf_file(path) || is_text_file(path)) {
                    files.push(path.to_path_buf());
                }
            }
        }

        files
    }

    /// Load every file under `paths`, skipping the ones that fail.
    pub fn load(&self, paths: &[PathBuf]) -> LoadReport {
        let mut report = LoadReport::default();

        for path in self.collect_files(paths) {
            match self.read_document(&path) {
                Ok(document) => {
                    debug!(
                        path = %path.display(),
                        pages = document.page_count(),
                        "loaded document"
                    );
                    report.documents.push(document);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping file");
                    report.failures.push((path, error));
                }
            }
        }

        report
    }

    /// Read one file into a [`Document`].
    pub fn read_document(&self, path: &Path) -> Result<Document, InputError> {
        let source = path.to_string_lossy().to_string();

        if !path.exists() {
            return Err(InputError::Unreadable {
                source_id: source,
                reason: "file not found".to_string(),
            });
        }

        let size = std::fs::metadata(path)
            .map_err(|e| unreadable(&source, e))?
            .len();
        if size > self.max_file_size {
            return Err(InputError::TooLarge {
                source_id: source,
                size,
                max: self.max_file_size,
            });
        }

        if is_pdf_file(path) {
            let pages = extract_pdf_pages(path).map_err(|reason| InputError::Unreadable {
                source_id: source.clone(),
                reason,
            })?;
            return Ok(Document::from_pages(source, pages));
        }

        let content =
            read_file_content(path, self.max_file_size).map_err(|e| unreadable(&source, e))?;
        Ok(Document::new(source, content))
    }
}

fn unreadable(source: &str, error: std::io::Error) -> InputError {
    InputError::Unreadable {
        source_id: source.to_string(),
        reason: error.to_string(),
    }
}

/// Run `pdftotext` and split its output into pages.
fn extract_pdf_pages(path: &Path) -> Result<Vec<String>, String> {
    let output = Command::new("pdftotext")
        .args(["-layout", "-enc", "UTF-8"])
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => format!("pdftotext not found. {PDFTOTEXT_INSTALL_HINT}"),
            _ => format!("failed to run pdftotext: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("pdftotext failed: {}", stderr.trim()));
    }

    Ok(split_pages(&String::from_utf8_lossy(&output.stdout)))
}

/// Split `pdftotext` output on form feeds, dropping the empty tail after the last page.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages() {
        assert_eq!(split_pages("one\u{c}two\u{c}"), vec!["one", "two"]);
        assert_eq!(split_pages("only"), vec!["only"]);
        // An empty page in the middle keeps page numbering intact
        assert_eq!(split_pages("a\u{c}\u{c}c\u{c}"), vec!["a", "", "c"]);
    }

    #[test]
    fn test_read_text_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Transformers rely on self-attention.").unwrap();

        let doc = LocalSource::new(1024).read_document(&path).unwrap();
        assert_eq!(doc.text, "Transformers rely on self-attention.");
        assert_eq!(doc.page_count(), 0);
        assert!(doc.source.ends_with("notes.txt"));
    }

    #[test]
    fn test_too_large() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(100)).unwrap();

        let result = LocalSource::new(10).read_document(&path);
        assert!(matches!(
            result,
            Err(InputError::TooLarge { size: 100, max: 10, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = LocalSource::new(10).read_document(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(InputError::Unreadable { .. })));
    }

    #[test]
    fn test_load_reports_missing_paths() {
        let report = LocalSource::new(10).load(&[PathBuf::from("/nonexistent/dir")]);
        assert!(report.documents.is_empty());
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_load_walks_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        fs::write(dir.path().join("sub/b.txt"), "B").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let report = LocalSource::new(1024).load(&[dir.path().to_path_buf()]);

        assert_eq!(report.documents.len(), 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_load_reports_failures() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        let big = dir.path().join("big.txt");
        fs::write(&good, "fine").unwrap();
        fs::write(&big, "x".repeat(64)).unwrap();

        let report = LocalSource::new(16).load(&[good, big.clone()]);

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, big);
    }
}
