//! File utilities for document loading.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// Check if a file is a PDF by extension.
pub fn is_pdf_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Check if a file is likely a text file.
pub fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if is_binary_extension(&ext) {
            return false;
        }
        if is_text_extension(&ext) {
            return true;
        }
    }

    // Sniff the first bytes for NUL
    if let Ok(file) = fs::File::open(path) {
        let mut buffer = [0u8; 512];
        let mut reader = std::io::BufReader::new(file);
        if let Ok(n) = reader.read(&mut buffer) {
            if n == 0 {
                return true;
            }
            return !buffer[..n].contains(&0);
        }
    }

    false
}

/// Ensure a file is no larger than `max_size` bytes, returning its size.
pub fn check_file_size(path: &Path, max_size: u64) -> std::io::Result<u64> {
    let metadata = fs::metadata(path)?;

    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }

    Ok(metadata.len())
}

/// Read file content with size limit.
pub fn read_file_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    check_file_size(path, max_size)?;
    fs::read_to_string(path)
}

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe"
            | "dll"
            | "so"
            | "dylib"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "bmp"
            | "webp"
            | "mp3"
            | "mp4"
            | "wav"
            | "zip"
            | "tar"
            | "gz"
            | "7z"
            | "pdf"
            | "doc"
            | "docx"
            | "xls"
            | "xlsx"
            | "ppt"
            | "pptx"
            | "db"
            | "sqlite"
            | "bin"
    )
}

fn is_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt"
            | "md"
            | "markdown"
            | "rst"
            | "adoc"
            | "org"
            | "tex"
            | "html"
            | "htm"
            | "csv"
            | "tsv"
            | "json"
            | "yaml"
            | "yml"
            | "toml"
            | "xml"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum("hello world");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, calculate_checksum("hello world"));
    }

    #[test]
    fn test_is_pdf_file() {
        assert!(is_pdf_file(&PathBuf::from("paper.pdf")));
        assert!(is_pdf_file(&PathBuf::from("PAPER.PDF")));
        assert!(!is_pdf_file(&PathBuf::from("notes.md")));
        assert!(!is_pdf_file(&PathBuf::from("pdf")));
    }

    #[test]
    fn test_is_text_file() {
        assert!(is_text_file(&PathBuf::from("notes.md")));
        assert!(!is_text_file(&PathBuf::from("figure.png")));
        assert!(!is_text_file(&PathBuf::from("paper.pdf")));
    }

    #[test]
    fn test_is_text_file_sniffs_content() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("README");
        std::fs::write(&text, "plain words").unwrap();
        assert!(is_text_file(&text));

        let binary = dir.path().join("blob");
        let mut f = std::fs::File::create(&binary).unwrap();
        f.write_all(&[0x7f, 0x00, 0x01]).unwrap();
        assert!(!is_text_file(&binary));
    }

    #[test]
    fn test_read_file_content_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "0123456789").unwrap();

        assert!(read_file_content(&path, 5).is_err());
        assert_eq!(read_file_content(&path, 10).unwrap(), "0123456789");
    }
}
