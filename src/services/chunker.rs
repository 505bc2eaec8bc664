//! Recursive text chunking with overlap.
//!
//! Text is split at the coarsest boundary that occurs in it (paragraph, line,
//! sentence, word) and the pieces are greedily merged back into chunks of at
//! most `chunk_size` characters. Pieces that are still too long are split again
//! with the next finer boundary, down to single characters. When a chunk is
//! emitted, trailing pieces totalling at most `overlap` characters are carried
//! into the next one.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::InputError;
use crate::models::{Chunk, ChunkingConfig, Document};

/// Boundary patterns, coarsest first. Each match stays attached to the text before it.
static SEPARATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\n[ \t\r]*\n\s*",
        r"\n",
        r#"[.!?]["')\]]*\s+"#,
        r"\s+",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// A document the chunker could not use.
#[derive(Debug)]
pub struct SkippedDocument {
    pub source: String,
    pub error: InputError,
}

/// Result of splitting a batch of documents.
#[derive(Debug, Default)]
pub struct SplitOutput {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedDocument>,
}

/// Text chunker that splits documents into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk length in characters
    chunk_size: usize,
    /// Maximum overlap between consecutive chunks in characters
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, InputError> {
        if chunk_size == 0 {
            return Err(InputError::InvalidParameters(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(InputError::InvalidParameters(format!(
                "overlap ({overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, InputError> {
        Self::new(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    /// Create a chunker with default settings.
    pub fn with_defaults() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split every document independently, skipping (and logging) unusable ones.
    pub fn split(&self, documents: &[Document]) -> SplitOutput {
        let mut output = SplitOutput::default();

        for document in documents {
            match self.chunk(document) {
                Ok(chunks) => output.chunks.extend(chunks),
                Err(error) => {
                    warn!(source = %document.source, error = %error, "skipping document");
                    output.skipped.push(SkippedDocument {
                        source: document.source.clone(),
                        error,
                    });
                }
            }
        }

        output
    }

    /// Chunk a single document. Pages are split independently.
    pub fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, InputError> {
        if document.is_blank() {
            return Err(InputError::EmptyDocument(document.source.clone()));
        }

        let mut chunks = Vec::new();
        for page in document.page_texts() {
            for (text, offset) in self.split_text(page.text) {
                let index = chunks.len() as u32;
                chunks.push(Chunk::new(
                    document,
                    text,
                    index,
                    (page.char_offset + offset) as u64,
                    page.number,
                ));
            }
        }

        debug!(
            source = %document.source,
            pages = document.page_count(),
            chunks = chunks.len(),
            "chunked document"
        );
        Ok(chunks)
    }

    /// Split text into chunks paired with their character offset in `text`.
    pub fn split_text(&self, text: &str) -> Vec<(String, usize)> {
        let spans = if char_len(text) <= self.chunk_size {
            trimmed_span(text, 0..text.len()).into_iter().collect()
        } else {
            self.split_recursive(text, 0..text.len(), &SEPARATORS)
        };

        let mut located = Vec::with_capacity(spans.len());
        let mut chars_before = 0;
        let mut last = 0;
        for span in spans {
            chars_before += text[last..span.start].chars().count();
            last = span.start;
            located.push((text[span].to_string(), chars_before));
        }
        located
    }

    fn split_recursive(
        &self,
        text: &str,
        span: Range<usize>,
        separators: &[Regex],
    ) -> Vec<Range<usize>> {
        let segment = &text[span.clone()];
        let found = separators.iter().position(|sep| sep.is_match(segment));
        let (pieces, finer) = match found {
            Some(i) => (
                split_keeping_separator(segment, &separators[i], span.start),
                &separators[i + 1..],
            ),
            None => (split_chars(segment, span.start), &separators[..0]),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<(Range<usize>, usize)> = Vec::new();

        for piece in pieces {
            let len = char_len(&text[piece.clone()]);
            if len < self.chunk_size {
                pending.push((piece, len));
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(text, &pending));
                pending.clear();
            }

            if found.is_none() {
                // A single character that alone fills a chunk
                chunks.extend(trimmed_span(text, piece));
            } else {
                chunks.extend(self.split_recursive(text, piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(text, &pending));
        }

        chunks
    }

    /// Greedily join adjacent pieces into chunks, carrying up to `overlap` characters forward.
    fn merge_pieces(&self, text: &str, pieces: &[(Range<usize>, usize)]) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0;

        for (piece, len) in pieces.iter().cloned() {
            if total + len > self.chunk_size && !window.is_empty() {
                chunks.extend(window_span(text, &window));

                while total > self.overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }

                // A chunk never starts on bare whitespace
                while let Some((front, dropped)) = window.front().cloned() {
                    if !text[front].trim().is_empty() {
                        break;
                    }
                    window.pop_front();
                    total -= dropped;
                }
            }

            if window.is_empty() && text[piece.clone()].trim().is_empty() {
                continue;
            }
            window.push_back((piece, len));
            total += len;
        }

        chunks.extend(window_span(text, &window));
        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The window's pieces are adjacent, so together they cover one contiguous span.
fn window_span(text: &str, window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    let start = window.front()?.0.start;
    let end = window.back()?.0.end;
    trimmed_span(text, start..end)
}

/// Narrow `span` to exclude surrounding whitespace; `None` if nothing is left.
fn trimmed_span(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let segment = &text[span.clone()];
    let trimmed = segment.trim_start();
    let start = span.start + (segment.len() - trimmed.len());
    let end = start + trimmed.trim_end().len();
    (end > start).then_some(start..end)
}

/// Split at every match of `separator`, keeping the match at the end of the preceding piece.
fn split_keeping_separator(segment: &str, separator: &Regex, base: usize) -> Vec<Range<usize>> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for m in separator.find_iter(segment) {
        if m.end() > start {
            pieces.push(base + start..base + m.end());
            start = m.end();
        }
    }

    if start < segment.len() {
        pieces.push(base + start..base + segment.len());
    }

    pieces
}

fn split_chars(segment: &str, base: usize) -> Vec<Range<usize>> {
    segment
        .char_indices()
        .map(|(i, c)| base + i..base + i + c.len_utf8())
        .collect()
}
