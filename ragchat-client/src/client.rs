//! HTTP client for the ragchat server endpoints.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::stream::consume_event_stream;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Returned by the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSummary {
    pub message: String,
    pub filename: String,
    pub chunks: usize,
    pub ids: Vec<String>,
}

/// Returned by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    pub status: String,
    pub vector_store: String,
    pub rag_available: bool,
    #[serde(default)]
    pub backend: Option<String>,
    pub collection: String,
    pub documents: Option<usize>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status: status.as_u16(), body })
    }

    /// Ask a question and stream the answer, calling `on_update` with the
    /// accumulated text as it grows.
    pub async fn ask(&self, prompt: &str, on_update: impl FnMut(&str)) -> Result<String> {
        let response =
            self.http.post(self.url("/api/ollama")).json(&json!({ "prompt": prompt })).send().await?;
        let response = Self::check(response).await?;
        debug!(status = %response.status(), "answer stream opened");
        consume_event_stream(response.bytes_stream(), on_update).await
    }

    /// Upload `contents` as a text document named `filename`.
    pub async fn upload(&self, filename: &str, contents: Vec<u8>) -> Result<UploadSummary> {
        let part = Part::bytes(contents).file_name(filename.to_string()).mime_str("text/plain")?;
        let form = Form::new().part("file", part);
        let response = self.http.post(self.url("/api/upload")).multipart(form).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Read a local file and upload it under its file name.
    pub async fn upload_file(&self, path: &Path) -> Result<UploadSummary> {
        let contents = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.txt".to_string());
        self.upload(&filename, contents).await
    }

    pub async fn status(&self) -> Result<ServerStatus> {
        let response = self.http.get(self.url("/api/status")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Remove every indexed document. Returns the server's confirmation.
    pub async fn clear(&self) -> Result<String> {
        let response = self.http.post(self.url("/api/clear-store")).send().await?;
        let body: MessageResponse = Self::check(response).await?.json().await?;
        Ok(body.message)
    }
}
