use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::utils::calculate_checksum;

/// Raw text of one uploaded file, optionally split into pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Where the text came from (usually a file path)
    pub source: String,
    pub text: String,
    /// Byte ranges of each page within `text`; empty when the source has no pages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<Range<usize>>,
    pub checksum: String,
}

/// One page (or the whole text, for unpaginated documents) of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageText<'a> {
    /// 1-based page number, `None` for unpaginated documents
    pub number: Option<u32>,
    pub text: &'a str,
    /// Character offset of this page within the document text
    pub char_offset: usize,
}

/// A bounded, overlapping slice of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source: String,
    pub text: String,
    pub chunk_index: u32,
    /// Character offset of the chunk within the document text
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Separator placed between pages when they are joined into one text.
const PAGE_SEPARATOR: &str = "\n\n";

impl Document {
    pub fn generate_id(source: &str) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(source.as_bytes());
        hex::encode(&hash[..16])
    }

    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        let source = source.into();
        let text = text.into();
        Self {
            id: Self::generate_id(&source),
            checksum: calculate_checksum(&text),
            source,
            text,
            pages: Vec::new(),
        }
    }

    /// Build a document from page texts, recording each page's boundaries.
    pub fn from_pages<I, S>(source: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut ranges = Vec::new();

        for (i, page) in pages.into_iter().enumerate() {
            if i > 0 {
                text.push_str(PAGE_SEPARATOR);
            }
            let start = text.len();
            text.push_str(page.as_ref());
            ranges.push(start..text.len());
        }

        let mut document = Self::new(source, text);
        document.pages = ranges;
        document
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Iterate over the pages of the document, or the whole text if it has none.
    pub fn page_texts(&self) -> Vec<PageText<'_>> {
        if self.pages.is_empty() {
            return vec![PageText {
                number: None,
                text: &self.text,
                char_offset: 0,
            }];
        }

        let mut chars_before = 0;
        let mut last_end = 0;
        self.pages
            .iter()
            .enumerate()
            .map(|(i, range)| {
                chars_before += self.text[last_end..range.start].chars().count();
                let page = PageText {
                    number: Some(i as u32 + 1),
                    text: &self.text[range.clone()],
                    char_offset: chars_before,
                };
                chars_before += page.text.chars().count();
                last_end = range.end;
                page
            })
            .collect()
    }
}

impl Chunk {
    pub fn generate_id(document_id: &str, chunk_index: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", document_id, chunk_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn new(
        document: &Document,
        text: String,
        chunk_index: u32,
        offset: u64,
        page: Option<u32>,
    ) -> Self {
        Self {
            id: Self::generate_id(&document.id, chunk_index),
            document_id: document.id.clone(),
            source: document.source.clone(),
            text,
            chunk_index,
            offset,
            page,
        }
    }

    /// Number of characters in the chunk text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Human-readable location: source plus page when known.
    pub fn location(&self) -> String {
        match self.page {
            Some(page) => format!("{} (page {})", self.source, page),
            None => self.source.clone(),
        }
    }

    /// First `max_chars` characters followed by "..." when truncated.
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let head: String = self.text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

impl EmbeddingRecord {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_generate_id() {
        let id = Document::generate_id("/path/to/paper.pdf");
        assert_eq!(id.len(), 32);
        assert_eq!(id, Document::generate_id("/path/to/paper.pdf"));
    }

    #[test]
    fn test_chunk_generate_id() {
        let id = Chunk::generate_id("abc123", 5);
        assert_eq!(id.len(), 36);
        assert!(id.chars().filter(|c| *c == '-').count() == 4);
        let id2 = Chunk::generate_id("abc123", 5);
        assert_eq!(id, id2);
        let id3 = Chunk::generate_id("abc123", 6);
        assert_ne!(id, id3);
    }

    #[test]
    fn test_unpaginated_document_has_single_page() {
        let doc = Document::new("notes.txt", "hello");
        let pages = doc.page_texts();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, None);
        assert_eq!(pages[0].text, "hello");
        assert_eq!(pages[0].char_offset, 0);
    }

    #[test]
    fn test_from_pages_tracks_boundaries() {
        let doc = Document::from_pages("paper.pdf", ["première", "second"]);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.text, "première\n\nsecond");

        let pages = doc.page_texts();
        assert_eq!(pages[0].number, Some(1));
        assert_eq!(pages[0].text, "première");
        assert_eq!(pages[1].number, Some(2));
        assert_eq!(pages[1].text, "second");
        // "première" is 8 characters (9 bytes) plus the 2-character separator
        assert_eq!(pages[1].char_offset, 10);
    }

    #[test]
    fn test_blank_document() {
        assert!(Document::new("a", "  \n\t ").is_blank());
        assert!(!Document::new("a", "x").is_blank());
    }

    #[test]
    fn test_chunk_preview_and_location() {
        let doc = Document::new("paper.pdf", "abcdef");
        let chunk = Chunk::new(&doc, "abcdef".to_string(), 0, 0, Some(3));
        assert_eq!(chunk.preview(3), "abc...");
        assert_eq!(chunk.preview(10), "abcdef");
        assert_eq!(chunk.location(), "paper.pdf (page 3)");
        assert_eq!(chunk.char_len(), 6);
    }
}
