//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: sliding window that prefers to end a chunk at a
//!   paragraph, then a sentence, then a word boundary
//! - [`FixedSizeChunker`]: sliding window with hard character cuts
//!
//! Both count characters, not bytes, and both declare an exact overlap on every
//! chunk after the first, so the source text can always be rebuilt from the
//! chunks (see [`Chunk::fresh_text`]).

use chrono::Utc;
use serde_json::Value;

use crate::config::RagConfig;
use crate::document::{Chunk, ChunkSpan, Metadata};

/// A strategy for splitting document text into chunks.
///
/// Implementations produce [`Chunk`]s carrying the caller's metadata plus a
/// `chunk_index` and an RFC 3339 `timestamp`. Embeddings are computed later
/// by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunks.
    ///
    /// Returns an empty `Vec` for empty text and exactly one chunk when the
    /// text fits in a single window.
    fn split(&self, text: &str, metadata: &Metadata) -> Vec<Chunk>;
}

/// Places where a window may end before its hard limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    /// Right after a blank line.
    Paragraph,
    /// Right after `.`, `!` or `?` followed by whitespace.
    Sentence,
    /// Right after any whitespace.
    Word,
}

impl Boundary {
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        match self {
            Boundary::Paragraph => end >= 2 && chars[end - 2] == '\n' && chars[end - 1] == '\n',
            Boundary::Sentence => {
                end >= 2
                    && chars[end - 1].is_whitespace()
                    && matches!(chars[end - 2], '.' | '!' | '?')
            }
            Boundary::Word => end >= 1 && chars[end - 1].is_whitespace(),
        }
    }
}

const NATURAL_BOUNDARIES: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

/// Splits text into windows of at most `chunk_size` characters, ending each
/// window at the best natural boundary it can find.
///
/// A window never ends before half of `chunk_size` (or before the overlap),
/// so a boundary far from the limit falls back to the next finer boundary and
/// finally to a hard cut.
///
/// # Example
///
/// ```rust
/// use ragchat_rag::{Chunker, Metadata, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(1000, 200);
/// let chunks = chunker.split(&"lorem ipsum ".repeat(250), &Metadata::new());
/// assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    window: Window,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap`: characters shared by consecutive chunks, clamped below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { window: Window::new(chunk_size, chunk_overlap) }
    }

    /// Create a chunker from a validated [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        build_chunks(text, metadata, &self.window, &NATURAL_BOUNDARIES)
    }
}

/// Splits text into windows of exactly `chunk_size` characters (the last one
/// may be shorter), each starting `chunk_overlap` characters before the
/// previous one ended.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    window: Window,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap`: characters shared by consecutive chunks, clamped below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { window: Window::new(chunk_size, chunk_overlap) }
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        build_chunks(text, metadata, &self.window, &[])
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    size: usize,
    overlap: usize,
}

impl Window {
    fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self { size, overlap: overlap.min(size - 1) }
    }

    /// Compute chunk spans over `chars`.
    fn spans(&self, chars: &[char], boundaries: &[Boundary]) -> Vec<ChunkSpan> {
        let total = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;
        let mut overlap = 0;

        while start < total {
            if total - start <= self.size {
                spans.push(ChunkSpan { start, end: total, overlap });
                break;
            }

            let hard_end = start + self.size;
            let earliest = start + (self.overlap + 1).max(self.size / 2);
            let end = boundaries
                .iter()
                .find_map(|boundary| {
                    (earliest..=hard_end).rev().find(|&end| boundary.ends_at(chars, end))
                })
                .unwrap_or(hard_end);

            spans.push(ChunkSpan { start, end, overlap });
            start = end - self.overlap;
            overlap = self.overlap;
        }

        spans
    }
}

fn build_chunks(
    text: &str,
    metadata: &Metadata,
    window: &Window,
    boundaries: &[Boundary],
) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    // Byte offset of every character plus the end of the string.
    let offsets: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();

    let created_at = Utc::now();
    let timestamp = created_at.to_rfc3339();

    window
        .spans(&chars, boundaries)
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let mut chunk_metadata = metadata.clone();
            chunk_metadata.insert("chunk_index".to_string(), Value::from(index));
            chunk_metadata.insert("timestamp".to_string(), Value::from(timestamp.clone()));
            Chunk {
                text: text[offsets[span.start]..offsets[span.end]].to_string(),
                metadata: chunk_metadata,
                created_at,
                span,
            }
        })
        .collect()
}
