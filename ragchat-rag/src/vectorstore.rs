//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{IndexedDocument, SearchResult};
use crate::error::Result;

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`IndexedDocument`]s. Documents
/// are append-only: there is no update, only add and delete-all.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("documents").await?;
/// store.add("documents", &docs).await?;
/// let results = store.search("documents", &query_embedding, 4).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and status reports.
    fn backend(&self) -> &'static str;

    /// Check that the backend is reachable.
    async fn heartbeat(&self) -> Result<()> {
        Ok(())
    }

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Add documents to a collection. Ids are assigned by the caller.
    async fn add(&self, collection: &str, documents: &[IndexedDocument]) -> Result<()>;

    /// Search for the `top_k` most similar documents to the given embedding.
    ///
    /// Returns results ordered by descending cosine similarity.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Number of documents in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;
}
