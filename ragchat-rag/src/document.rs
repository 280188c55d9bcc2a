//! Data types for chunks, indexed documents, and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to chunks and indexed documents.
pub type Metadata = Map<String, Value>;

/// An embedding vector produced by an [`EmbeddingProvider`](crate::EmbeddingProvider).
pub type EmbeddingVector = Vec<f32>;

/// Character offsets of a [`Chunk`] inside the text it was split from.
///
/// `overlap` is the number of leading characters this chunk shares with the
/// previous one. Dropping them from every chunk and concatenating the rest
/// gives back the source text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Offset of the first character, inclusive.
    pub start: usize,
    /// Offset one past the last character.
    pub end: usize,
    /// Characters shared with the previous chunk.
    pub overlap: usize,
}

impl ChunkSpan {
    /// Number of characters covered by the span.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span covers no characters.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A bounded window of a source document produced by a [`Chunker`](crate::Chunker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Caller metadata plus `chunk_index` and `timestamp`.
    pub metadata: Metadata,
    /// When the chunk was produced.
    pub created_at: DateTime<Utc>,
    /// Where the chunk sits in the source text.
    pub span: ChunkSpan,
}

impl Chunk {
    /// The part of the text that is not shared with the previous chunk.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.span.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// A document ready to be added to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    /// The chunk text stored alongside the vector.
    pub text: String,
    /// The embedding for `text`.
    pub vector: EmbeddingVector,
    /// Metadata stored with the document.
    pub metadata: Metadata,
}

/// A document stored in a collection. Never updated once added.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    /// Identifier generated at insert time.
    pub id: String,
    /// The stored embedding.
    pub vector: EmbeddingVector,
    /// The stored text.
    pub text: String,
    /// The stored metadata.
    pub metadata: Metadata,
}

/// A retrieved document paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Identifier of the matched document.
    pub id: String,
    /// The matched text.
    pub text: String,
    /// The matched document's metadata.
    pub metadata: Metadata,
    /// Cosine similarity to the query (higher is closer).
    pub score: f32,
}
