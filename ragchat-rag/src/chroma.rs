//! Chroma vector store backend.
//!
//! Provides [`ChromaVectorStore`] which implements [`VectorStore`] against the
//! Chroma REST API (`/api/v1`) with `reqwest`. Collections are created with
//! cosine distance, and scores are reported as `1 - distance`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchat_rag::chroma::ChromaVectorStore;
//!
//! let store = ChromaVectorStore::new("http://localhost:8000")?;
//! store.create_collection("documents").await?;
//! store.add("documents", &docs).await?;
//! let results = store.search("documents", &query_embedding, 4).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{IndexedDocument, Metadata, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// The default Chroma base URL.
pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";

/// Upper bound for one vector store request.
pub const CHROMA_TIMEOUT: Duration = Duration::from_secs(30);

const SERVICE: &str = "chroma";

/// A [`VectorStore`] backed by a [Chroma](https://www.trychroma.com/) server.
///
/// Chroma addresses collections by id for data operations and by name for
/// creation and deletion, so resolved ids are cached per name.
#[derive(Debug)]
pub struct ChromaVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection_ids: RwLock<HashMap<String, String>>,
}

impl ChromaVectorStore {
    /// Create a store talking to the Chroma server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CHROMA_TIMEOUT)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a store from an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection_ids: RwLock::new(HashMap::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response =
            request.send().await.map_err(|e| RagError::from_transport(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::upstream_status(SERVICE, status.as_u16(), body));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response.json().await.map_err(|e| RagError::UpstreamError {
            service: SERVICE.into(),
            status: None,
            message: format!("failed to parse response: {e}"),
        })
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.collection_ids.read().await.get(name) {
            return Ok(id.clone());
        }
        let collection: CollectionResponse =
            self.send_json(self.client.get(self.url(&format!("/collections/{name}")))).await?;
        self.collection_ids.write().await.insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct AddRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    metadatas: Vec<Metadata>,
    documents: Vec<&'a str>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

/// Chroma only stores scalar metadata values; anything else is stored as JSON text.
fn scalar_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => v.clone(),
                other => Value::String(other.to_string()),
            };
            (k.clone(), value)
        })
        .collect()
}

impl QueryResponse {
    fn into_results(self) -> Vec<SearchResult> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let mut documents =
            self.documents.and_then(|d| d.into_iter().next()).unwrap_or_default().into_iter();
        let mut metadatas =
            self.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default().into_iter();
        let mut distances =
            self.distances.and_then(|d| d.into_iter().next()).unwrap_or_default().into_iter();

        ids.into_iter()
            .map(|id| SearchResult {
                id,
                text: documents.next().flatten().unwrap_or_default(),
                metadata: metadatas.next().flatten().unwrap_or_default(),
                score: distances.next().map(|d| 1.0 - d).unwrap_or_default(),
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    fn backend(&self) -> &'static str {
        SERVICE
    }

    async fn heartbeat(&self) -> Result<()> {
        self.send(self.client.get(self.url("/heartbeat"))).await?;
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        let body = json!({
            "name": name,
            "metadata": { "hnsw:space": "cosine" },
            "get_or_create": true,
        });
        let collection: CollectionResponse =
            self.send_json(self.client.post(self.url("/collections")).json(&body)).await?;
        debug!(collection = name, id = %collection.id, "chroma collection ready");
        self.collection_ids.write().await.insert(name.to_string(), collection.id);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("/collections/{name}")))).await?;
        self.collection_ids.write().await.remove(name);
        debug!(collection = name, "deleted chroma collection");
        Ok(())
    }

    async fn add(&self, collection: &str, documents: &[IndexedDocument]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let id = self.collection_id(collection).await?;
        let body = AddRequest {
            ids: documents.iter().map(|d| d.id.as_str()).collect(),
            embeddings: documents.iter().map(|d| d.vector.as_slice()).collect(),
            metadatas: documents.iter().map(|d| scalar_metadata(&d.metadata)).collect(),
            documents: documents.iter().map(|d| d.text.as_str()).collect(),
        };
        self.send(self.client.post(self.url(&format!("/collections/{id}/add"))).json(&body))
            .await?;

        debug!(collection, count = documents.len(), "added documents to chroma");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let id = self.collection_id(collection).await?;
        let body = QueryRequest {
            query_embeddings: [embedding],
            n_results: top_k,
            include: ["documents", "metadatas", "distances"],
        };
        let response: QueryResponse = self
            .send_json(self.client.post(self.url(&format!("/collections/{id}/query"))).json(&body))
            .await?;
        Ok(response.into_results())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let id = self.collection_id(collection).await?;
        self.send_json(self.client.get(self.url(&format!("/collections/{id}/count")))).await
    }
}
