//! Re-framing an upstream NDJSON generation as Server-Sent Events.
//!
//! Each upstream object with non-empty `response` text becomes one SSE frame
//! as soon as its line is complete, and the terminal `done` object is passed
//! through so the client sees the model metadata. A failure after streaming
//! has started cannot change the HTTP status any more, so it is reported as a
//! final `{"error": ..., "done": true}` frame.

use std::convert::Infallible;

use async_stream::stream;
use axum::response::sse::{Event, Sse};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use ragchat_rag::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::ndjson::{LineDecoder, parse_line};

/// One generation update. Fields this type does not name are kept in `extra`
/// and forwarded unchanged, except the `context` token array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Ollama's encoded conversation state; large and useless to the client.
const CONTEXT_FIELD: &str = "context";

impl StreamEvent {
    pub fn text(response: impl Into<String>) -> Self {
        Self { response: Some(response.into()), ..Self::default() }
    }

    pub fn is_done(&self) -> bool {
        self.done == Some(true)
    }

    fn has_text(&self) -> bool {
        self.response.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// An error reported by the model server inside the stream.
    fn upstream_error(&self) -> Option<String> {
        self.extra.get("error").map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// One outgoing SSE frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    Event(StreamEvent),
    Error(String),
}

impl RelayFrame {
    /// The frame's `data` payload.
    pub fn payload(&self) -> Value {
        match self {
            RelayFrame::Event(event) => serde_json::to_value(event).unwrap_or(Value::Null),
            RelayFrame::Error(message) => json!({ "error": message, "done": true }),
        }
    }

    pub fn into_sse(self) -> Event {
        Event::default().data(self.payload().to_string())
    }
}

/// Turn upstream body chunks into relay frames, one per forwarded object.
///
/// The output does not depend on where the upstream split its chunks.
pub fn relay<S>(upstream: S) -> impl Stream<Item = RelayFrame> + Send + 'static
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    stream! {
        let mut upstream = Box::pin(upstream);
        let mut decoder = LineDecoder::new();
        let mut forwarded = 0usize;
        let mut failure = None;

        'read: while let Some(chunk) = upstream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, forwarded, "upstream stream failed");
                    failure = Some(e.to_string());
                    break;
                }
            };
            for line in decoder.push(&bytes) {
                match classify(&line) {
                    Some(Ok(event)) => {
                        forwarded += 1;
                        yield RelayFrame::Event(event);
                    }
                    Some(Err(message)) => {
                        failure = Some(message);
                        break 'read;
                    }
                    None => {}
                }
            }
        }

        match failure {
            Some(message) => yield RelayFrame::Error(message),
            None => {
                if let Some(line) = decoder.finish() {
                    match classify(&line) {
                        Some(Ok(event)) => {
                            forwarded += 1;
                            yield RelayFrame::Event(event);
                        }
                        Some(Err(message)) => yield RelayFrame::Error(message),
                        None => {}
                    }
                }
                info!(forwarded, "relay stream completed");
            }
        }
    }
}

/// `Some(Ok)` to forward, `Some(Err)` for an in-band upstream error, `None` to skip.
fn classify(line: &str) -> Option<std::result::Result<StreamEvent, String>> {
    let mut event: StreamEvent = parse_line(line)?;
    if let Some(message) = event.upstream_error() {
        warn!(error = %message, "model reported an error mid-stream");
        return Some(Err(message));
    }
    event.extra.remove(CONTEXT_FIELD);
    (event.has_text() || event.is_done()).then_some(Ok(event))
}

/// Wrap relay frames as an SSE response. No keep-alive comments are sent.
pub fn into_sse<S>(frames: S) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>
where
    S: Stream<Item = RelayFrame> + Send + 'static,
{
    Sse::new(frames.map(|frame| Ok::<_, Infallible>(frame.into_sse())))
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    async fn run(chunks: Vec<Result<Bytes>>) -> Vec<RelayFrame> {
        relay(stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn forwards_text_and_done_but_not_empty_updates() {
        let body = concat!(
            "{\"model\":\"mistral\",\"response\":\"Hel\",\"done\":false}\n",
            "{\"model\":\"mistral\",\"response\":\"\",\"done\":false}\n",
            "{\"model\":\"mistral\",\"response\":\"lo\",\"done\":false}\n",
            "{\"model\":\"mistral\",\"response\":\"\",\"done\":true,\"eval_count\":2,\"context\":[1,2]}\n",
        );
        let frames = run(vec![Ok(Bytes::from(body))]).await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload()["response"], "Hel");
        assert_eq!(frames[1].payload()["response"], "lo");
        let last = frames[2].payload();
        assert_eq!(last["done"], true);
        assert_eq!(last["eval_count"], 2);
        assert_eq!(last["model"], "mistral");
        assert!(last.get("context").is_none());
    }

    #[tokio::test]
    async fn flushes_final_line_without_newline() {
        let frames = run(vec![Ok(Bytes::from_static(b"{\"response\":\"tail\"}"))]).await;
        assert_eq!(frames, vec![RelayFrame::Event(StreamEvent::text("tail"))]);
    }

    #[tokio::test]
    async fn transport_error_ends_with_error_frame() {
        let frames = run(vec![
            Ok(Bytes::from_static(b"{\"response\":\"par\"}\n{\"respo")),
            Err(ragchat_rag::RagError::UpstreamError {
                service: "ollama".into(),
                status: None,
                message: "connection reset".into(),
            }),
            Ok(Bytes::from_static(b"nse\":\"never\"}\n")),
        ])
        .await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload()["response"], "par");
        let error = frames[1].payload();
        assert_eq!(error["done"], true);
        assert!(error["error"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn in_band_error_ends_stream() {
        let body = "{\"response\":\"a\"}\n{\"error\":\"model crashed\"}\n{\"response\":\"b\"}\n";
        let frames = run(vec![Ok(Bytes::from(body))]).await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], RelayFrame::Error("model crashed".into()));
    }

    #[test]
    fn error_frame_payload() {
        let frame = RelayFrame::Error("boom".into());
        assert_eq!(frame.payload(), json!({ "error": "boom", "done": true }));
    }
}
