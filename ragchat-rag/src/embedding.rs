//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::document::EmbeddingVector;
use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap an external embedding service behind a unified
/// async interface. The service is a black box returning one fixed-dimension
/// vector per input string, in input order.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::EmbeddingProvider;
///
/// let vectors = provider.embed_batch(&["first chunk", "second chunk"]).await?;
/// let query = provider.embed("what is in the first chunk?").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input (the query path).
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Backends with native batching override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}
