//! Streaming text generation against Ollama `/api/generate`.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::stream::{BoxStream, StreamExt};
use ragchat_rag::{FALLBACK_PHRASE, RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Upper bound for the model to start answering, and for each silence
/// between body chunks once it has.
pub const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(30);

const SERVICE: &str = "ollama";

/// Raw body chunks of a streaming generation, as received.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Produces a streamed NDJSON completion for a prompt.
#[async_trait]
pub trait ModelGenerator: Send + Sync {
    /// The model name reported in logs.
    fn model(&self) -> &str;

    /// Start generating. Resolves once the upstream has accepted the request,
    /// failing before any body bytes are read.
    async fn generate(&self, prompt: &str) -> Result<ByteStream>;
}

/// Fixed decoding options sent with every generate request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: i32,
    pub seed: i64,
    pub repeat_penalty: f32,
    pub presence_penalty: f32,
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 1024,
            seed: 42,
            repeat_penalty: 1.1,
            presence_penalty: 0.0,
            stop: vec![FALLBACK_PHRASE.to_string(), "\nQuestion:".to_string()],
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// A [`ModelGenerator`] backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
    first_byte_timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(FIRST_BYTE_TIMEOUT)
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options: GenerateOptions::default(),
            first_byte_timeout: FIRST_BYTE_TIMEOUT,
        })
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.first_byte_timeout = timeout;
        self
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }
}

#[async_trait]
impl ModelGenerator for OllamaGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ByteStream> {
        let request = self.client.post(format!("{}/api/generate", self.base_url)).json(
            &GenerateRequest {
                model: &self.model,
                prompt,
                stream: true,
                options: &self.options,
            },
        );

        debug!(model = %self.model, prompt_len = prompt.len(), "sending generate request");
        let response = tokio::time::timeout(self.first_byte_timeout, request.send())
            .await
            .map_err(|_| RagError::UpstreamTimeout {
                service: SERVICE.into(),
                message: format!(
                    "no response within {} ms",
                    self.first_byte_timeout.as_millis()
                ),
            })?
            .map_err(|e| {
                error!(model = %self.model, error = %e, "generate request failed");
                RagError::from_transport(SERVICE, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            error!(model = %self.model, %status, "generate API error");
            return Err(RagError::upstream_status(SERVICE, status.as_u16(), detail));
        }

        Ok(idle_bounded(response.bytes_stream(), self.first_byte_timeout))
    }
}

/// End the body with [`RagError::UpstreamTimeout`] when no chunk arrives
/// within `idle` of the previous one.
fn idle_bounded<S>(body: S, idle: Duration) -> ByteStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    stream! {
        let mut body = Box::pin(body);
        loop {
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(chunk)) => yield chunk.map_err(|e| RagError::from_transport(SERVICE, e)),
                Ok(None) => break,
                Err(_) => {
                    warn!(idle_ms = idle.as_millis() as u64, "model stream stalled");
                    yield Err(RagError::UpstreamTimeout {
                        service: SERVICE.into(),
                        message: format!("no data for {} ms", idle.as_millis()),
                    });
                    break;
                }
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_fixed_options() {
        let options = GenerateOptions::default();
        let body = serde_json::to_value(GenerateRequest {
            model: "mistral",
            prompt: "hi",
            stream: true,
            options: &options,
        })
        .unwrap();

        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 1024);
        assert_eq!(body["options"]["seed"], 42);
        assert_eq!(body["options"]["presence_penalty"], 0.0);
        assert_eq!(body["options"]["stop"][0], FALLBACK_PHRASE);
    }

    #[tokio::test]
    async fn stalled_body_ends_with_timeout() {
        let body = futures::stream::iter([Ok(Bytes::from_static(b"{\"response\":\"Hel\"}\n"))])
            .chain(futures::stream::pending());
        let chunks: Vec<_> = idle_bounded(body, Duration::from_millis(50)).collect().await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(chunks[1], Err(RagError::UpstreamTimeout { .. })));
    }
}
