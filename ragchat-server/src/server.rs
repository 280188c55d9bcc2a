use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, sse::{Event, Sse}},
    routing::{get, post},
};
use futures::Stream;
use ragchat_rag::{
    ChromaVectorStore, DocumentIndex, EmbeddingProvider, InMemoryVectorStore, Metadata,
    OllamaEmbeddingProvider, RagConfig, RagPipeline, RecursiveChunker, VectorStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::{DEFAULT_MAX_UPLOAD_BYTES, ServerConfig, VectorStoreKind},
    error::ApiError,
    model::{ModelGenerator, OllamaGenerator},
    relay,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub generator: Arc<dyn ModelGenerator>,
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("model", &self.generator.model())
            .field("collection", &self.pipeline.index().collection())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>, generator: Arc<dyn ModelGenerator>) -> Self {
        Self { pipeline, generator, max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES }
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Build the Ollama and vector store clients named by `config`.
    ///
    /// The collection is ensured once here; an unreachable store leaves the
    /// server running with retrieval disabled.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
            OllamaEmbeddingProvider::new(&config.ollama_url, &config.embedding_model)
                .context("failed to create embedding client")?,
        );
        let store: Arc<dyn VectorStore> = match config.vector_store {
            VectorStoreKind::Chroma => Arc::new(
                ChromaVectorStore::new(&config.chroma_url)
                    .context("failed to create vector store client")?,
            ),
            VectorStoreKind::Memory => Arc::new(InMemoryVectorStore::new()),
        };

        let index = Arc::new(DocumentIndex::new(store, embedder.clone(), config.collection.clone()));
        let readiness = index.ensure_collection().await;
        if !readiness.is_ready() {
            warn!(?readiness, "starting without retrieval, documents cannot be indexed yet");
        }

        let rag_config = RagConfig::default();
        let pipeline = RagPipeline::builder()
            .chunker(Arc::new(RecursiveChunker::from_config(&rag_config)))
            .config(rag_config)
            .embedding_provider(embedder)
            .index(index)
            .build()?;

        let generator = OllamaGenerator::new(&config.ollama_url, &config.model)
            .context("failed to create generation client")?;

        Ok(Self::new(Arc::new(pipeline), Arc::new(generator))
            .with_max_upload_bytes(config.max_upload_bytes))
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload).layer(upload_limit))
        .route("/api/ollama", post(chat))
        .route("/api/status", get(status))
        .route("/api/clear-store", post(clear_store))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).await?;
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for ragchat-server")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        model = %config.model,
        ollama = %config.ollama_url,
        vector_store = ?config.vector_store,
        "ragchat-server listening on http://{}",
        addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status":"ok","service":"ragchat-server"}))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub chunks: usize,
    pub ids: Vec<String>,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let invalid_upload = |e: axum::extract::multipart::MultipartError| {
        ApiError::new(e.status(), "Invalid upload", e.body_text())
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid_upload)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload.txt").to_string();
        let bytes = field.bytes().await.map_err(invalid_upload)?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::bad_request(format!("{filename} is not UTF-8 text")))?;

        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!(filename));
        let report = state.pipeline.ingest(&text, &metadata).await?;
        info!(filename = %filename, chunks = report.chunks, bytes = text.len(), "processed upload");

        return Ok(Json(UploadResponse {
            message: "File processed successfully".to_string(),
            filename,
            chunks: report.chunks,
            ids: report.ids,
        }));
    }

    Err(ApiError::bad_request("No file uploaded"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("Prompt is required"));
    }

    let augmented = state.pipeline.augment(prompt).await?;
    if augmented.degraded {
        warn!("vector store unavailable, prompt sent without context");
    }
    info!(
        model = state.generator.model(),
        sources = augmented.sources.len(),
        "relaying generation"
    );

    let upstream = state.generator.generate(&augmented.prompt).await?;
    Ok(relay::into_sse(relay::relay(upstream)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub vector_store: String,
    pub rag_available: bool,
    pub backend: String,
    pub collection: String,
    pub documents: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let index = state.pipeline.index().status().await;
    let reason = match &index.readiness {
        ragchat_rag::Readiness::Degraded(reason) => Some(reason.clone()),
        _ => None,
    };
    Json(StatusResponse {
        status: "ok".to_string(),
        vector_store: index.readiness.label().to_string(),
        rag_available: index.readiness.is_ready(),
        backend: index.backend.to_string(),
        collection: index.collection,
        documents: index.documents,
        reason,
    })
}

async fn clear_store(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.pipeline.index().clear().await?;
    Ok(Json(json!({"message":"Vector store cleared successfully"})))
}
