//! # ragchat-rag
//!
//! Retrieval building blocks for the ragchat backend.
//!
//! ## Overview
//!
//! - [`Chunker`]: overlapping windows over document text ([`RecursiveChunker`], [`FixedSizeChunker`])
//! - [`EmbeddingProvider`]: text to vectors ([`OllamaEmbeddingProvider`])
//! - [`VectorStore`]: similarity storage ([`ChromaVectorStore`], [`InMemoryVectorStore`])
//! - [`DocumentIndex`]: the single collection with its readiness state and id generation
//! - [`PromptTemplate`]: renders the retrieval-augmented prompt
//! - [`RagPipeline`]: ingest (chunk → embed → index) and augment (retrieve → prompt)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragchat_rag::*;
//!
//! let embedder: Arc<dyn EmbeddingProvider> =
//!     Arc::new(OllamaEmbeddingProvider::new("http://localhost:11434", "mistral")?);
//! let store: Arc<dyn VectorStore> = Arc::new(ChromaVectorStore::new("http://localhost:8000")?);
//! let index = Arc::new(DocumentIndex::new(store, embedder.clone(), DEFAULT_COLLECTION));
//! index.ensure_collection().await;
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(embedder)
//!     .index(index)
//!     .chunker(Arc::new(RecursiveChunker::new(1000, 200)))
//!     .build()?;
//! ```

pub mod chroma;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod inmemory;
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod vectorstore;

pub use chroma::ChromaVectorStore;
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker};
pub use config::{DEFAULT_COLLECTION, RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkSpan, EmbeddingVector, IndexedDocument, Metadata, NewDocument, SearchResult,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use index::{DocumentIndex, IndexStatus, Query, Readiness};
pub use inmemory::InMemoryVectorStore;
pub use ollama::OllamaEmbeddingProvider;
pub use pipeline::{AugmentedPrompt, IngestReport, RagPipeline, RagPipelineBuilder};
pub use prompt::{FALLBACK_PHRASE, PromptTemplate};
pub use vectorstore::VectorStore;
