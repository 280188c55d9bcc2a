//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest workflow (chunk → embed → index)
//! and the question workflow (retrieve → build prompt) by composing a
//! [`Chunker`], an [`EmbeddingProvider`], a [`DocumentIndex`] and a
//! [`PromptTemplate`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_rag::{RagPipeline, RagConfig, RecursiveChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(embedder.clone())
//!     .index(index.clone())
//!     .chunker(Arc::new(RecursiveChunker::new(1000, 200)))
//!     .build()?;
//!
//! let report = pipeline.ingest(&text, &metadata).await?;
//! let augmented = pipeline.augment("what does the report say?").await?;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::document::{Metadata, NewDocument, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{DocumentIndex, Query};
use crate::prompt::PromptTemplate;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestReport {
    /// Number of chunks stored.
    pub chunks: usize,
    /// Generated ids, one per chunk, in chunk order.
    pub ids: Vec<String>,
}

/// A prompt ready for the model, with the chunks it was built from.
#[derive(Debug, Clone)]
pub struct AugmentedPrompt {
    /// The rendered prompt.
    pub prompt: String,
    /// The retrieved chunks, closest first.
    pub sources: Vec<SearchResult>,
    /// Whether retrieval was skipped because the index is not available.
    pub degraded: bool,
}

/// The RAG pipeline orchestrator. Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    index: Arc<DocumentIndex>,
    chunker: Arc<dyn Chunker>,
    template: PromptTemplate,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the document index.
    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    /// Return a reference to the prompt template.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Ingest one document: chunk → embed → index.
    ///
    /// The collection is ensured first, so an upload after a clear recreates it.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] if the vector store is unavailable,
    /// or the embedding/store error.
    pub async fn ingest(&self, text: &str, metadata: &Metadata) -> Result<IngestReport> {
        self.index.ensure_ready().await?;

        let chunks = self.chunker.split(text, metadata);
        if chunks.is_empty() {
            info!(chunk_count = 0, "ingested document (empty)");
            return Ok(IngestReport { chunks: 0, ids: Vec::new() });
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(error = %e, chunk_count = chunks.len(), "embedding failed during ingestion");
            e
        })?;

        let documents: Vec<NewDocument> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| NewDocument { text: chunk.text, vector, metadata: chunk.metadata })
            .collect();

        let ids = self.index.add(documents).await.map_err(|e| {
            error!(error = %e, "indexing failed during ingestion");
            e
        })?;

        info!(chunk_count = ids.len(), "ingested document");
        Ok(IngestReport { chunks: ids.len(), ids })
    }

    /// Retrieve the `top_k` chunks closest to `query`, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] if the index is not ready, or the
    /// embedding/store error.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let results = self.index.query(Query::Text(query), self.config.top_k).await?;
        info!(result_count = results.len(), "retrieval completed");
        Ok(results)
    }

    /// Retrieve context for `query` and render the prompt.
    ///
    /// When the vector store is unavailable the question is still answered,
    /// with the context-free template, and the result is marked `degraded`.
    ///
    /// # Errors
    ///
    /// Returns embedding or store errors other than [`RagError::NotInitialized`].
    pub async fn augment(&self, query: &str) -> Result<AugmentedPrompt> {
        let (sources, degraded) = match self.index.ensure_ready().await {
            Ok(()) => (self.retrieve(query).await?, false),
            Err(RagError::NotInitialized) => {
                warn!("vector store not ready, answering without retrieved context");
                (Vec::new(), true)
            }
            Err(e) => return Err(e),
        };

        Ok(AugmentedPrompt { prompt: self.template.build(query, &sources), sources, degraded })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider`, `index` and `chunker` are required; `config` and
/// `template` default.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<DocumentIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    template: Option<PromptTemplate>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for chunks.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the document index.
    pub fn index(mut self, index: Arc<DocumentIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the prompt template.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let index = self.index.ok_or_else(|| RagError::Config("index is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::Config("chunker is required".to_string()))?;

        Ok(RagPipeline {
            config: self.config.unwrap_or_default(),
            embedding_provider,
            index,
            chunker,
            template: self.template.unwrap_or_default(),
        })
    }
}
