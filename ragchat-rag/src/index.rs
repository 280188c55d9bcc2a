//! The document index: one collection in a [`VectorStore`] plus its readiness.
//!
//! [`DocumentIndex`] is the single long-lived vector client of the system. It
//! starts [`Readiness::Uninitialized`], moves to [`Readiness::Ready`] once the
//! collection exists, or to [`Readiness::Degraded`] when the store cannot be
//! reached. Every data operation requires `Ready` and fails with
//! [`RagError::NotInitialized`] otherwise.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::document::{IndexedDocument, NewDocument, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Lifecycle of the index collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Readiness {
    /// No collection has been ensured yet, or it was cleared.
    Uninitialized,
    /// The collection exists and accepts reads and writes.
    Ready,
    /// The last attempt to ensure the collection failed.
    Degraded(String),
}

impl Readiness {
    /// Whether data operations are allowed.
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    /// Short label used in status reports.
    pub fn label(&self) -> &'static str {
        match self {
            Readiness::Uninitialized => "uninitialized",
            Readiness::Ready => "ready",
            Readiness::Degraded(_) => "degraded",
        }
    }
}

/// What to search with.
#[derive(Debug, Clone, Copy)]
pub enum Query<'a> {
    /// A precomputed embedding.
    Vector(&'a [f32]),
    /// Text, embedded with the index's provider before searching.
    Text(&'a str),
}

/// Snapshot reported by [`DocumentIndex::status`].
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    /// Current readiness.
    pub readiness: Readiness,
    /// Collection name.
    pub collection: String,
    /// Vector store backend name.
    pub backend: &'static str,
    /// Number of stored documents, when the store could be asked.
    pub documents: Option<usize>,
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a document id from a process-wide counter and a nanosecond timestamp.
///
/// The counter alone makes ids unique within the process; the timestamp keeps
/// ids from separate runs apart in a persistent store.
pub fn generate_id() -> String {
    let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("doc_{nanos}_{seq}")
}

/// The vector index client used by request handlers.
pub struct DocumentIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    readiness: RwLock<Readiness>,
}

impl DocumentIndex {
    /// Create an index over `collection` in `store`. Nothing is contacted
    /// until [`ensure_collection`](Self::ensure_collection) is called.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
            readiness: RwLock::new(Readiness::Uninitialized),
        }
    }

    /// The collection this index stores documents in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Current readiness.
    pub async fn readiness(&self) -> Readiness {
        self.readiness.read().await.clone()
    }

    /// Create or get the collection. Idempotent.
    ///
    /// Never fails: an unreachable store leaves the index
    /// [`Readiness::Degraded`] so the rest of the system can keep running.
    pub async fn ensure_collection(&self) -> Readiness {
        let outcome = match self.store.heartbeat().await {
            Ok(()) => self.store.create_collection(&self.collection).await,
            Err(e) => Err(e),
        };

        let readiness = match outcome {
            Ok(()) => {
                info!(collection = %self.collection, backend = self.store.backend(), "vector store ready");
                Readiness::Ready
            }
            Err(e) => {
                warn!(
                    collection = %self.collection,
                    backend = self.store.backend(),
                    error = %e,
                    "vector store unavailable, retrieval disabled"
                );
                Readiness::Degraded(e.to_string())
            }
        };

        *self.readiness.write().await = readiness.clone();
        readiness
    }

    /// Ensure the collection if it is not ready yet.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] if the collection still cannot be ensured.
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.readiness.read().await.is_ready() {
            return Ok(());
        }
        if self.ensure_collection().await.is_ready() { Ok(()) } else { Err(RagError::NotInitialized) }
    }

    async fn require_ready(&self) -> Result<()> {
        if self.readiness.read().await.is_ready() { Ok(()) } else { Err(RagError::NotInitialized) }
    }

    /// Add documents, returning their generated ids in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] when the index is not ready, or the
    /// store's error if the insert fails.
    pub async fn add(&self, documents: Vec<NewDocument>) -> Result<Vec<String>> {
        self.require_ready().await?;

        let documents: Vec<IndexedDocument> = documents
            .into_iter()
            .map(|doc| IndexedDocument {
                id: generate_id(),
                vector: doc.vector,
                text: doc.text,
                metadata: doc.metadata,
            })
            .collect();

        self.store.add(&self.collection, &documents).await?;
        info!(collection = %self.collection, count = documents.len(), "indexed documents");

        Ok(documents.into_iter().map(|doc| doc.id).collect())
    }

    /// Return up to `k` nearest documents, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] when the index is not ready, or the
    /// embedding/store error.
    pub async fn query(&self, query: Query<'_>, k: usize) -> Result<Vec<SearchResult>> {
        self.require_ready().await?;

        let results = match query {
            Query::Vector(vector) => self.store.search(&self.collection, vector, k).await?,
            Query::Text(text) => {
                let vector = self.embedder.embed(text).await?;
                self.store.search(&self.collection, &vector, k).await?
            }
        };
        Ok(results)
    }

    /// Delete the whole collection. The index becomes
    /// [`Readiness::Uninitialized`] until the collection is ensured again.
    ///
    /// Concurrent clears are not coordinated.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotInitialized`] when the index is not ready, or the
    /// store's error if the delete fails.
    pub async fn clear(&self) -> Result<()> {
        self.require_ready().await?;
        self.store.delete_collection(&self.collection).await?;
        *self.readiness.write().await = Readiness::Uninitialized;
        info!(collection = %self.collection, "cleared vector store");
        Ok(())
    }

    /// Readiness plus document count, for the status endpoint.
    pub async fn status(&self) -> IndexStatus {
        let readiness = self.readiness().await;
        let documents = if readiness.is_ready() {
            self.store.count(&self.collection).await.ok()
        } else {
            None
        };
        IndexStatus {
            readiness,
            collection: self.collection.clone(),
            backend: self.store.backend(),
            documents,
        }
    }
}
