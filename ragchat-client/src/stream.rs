//! Incremental consumption of the chat event stream.
//!
//! The server sends one `data: <json>` frame per generated fragment. Frames
//! are decoded as they arrive so the caller can render the answer while it
//! grows; a frame that is not valid JSON is skipped rather than ending the read.

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

#[derive(Debug, Default, Deserialize)]
struct Frame {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Read `stream` to the end, calling `on_update` with the accumulated text
/// every time it grows. Returns the full answer.
///
/// # Errors
///
/// Fails on a transport error or when the server sends an `error` frame.
pub async fn consume_event_stream<S, B, E>(
    stream: S,
    mut on_update: impl FnMut(&str),
) -> Result<String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = std::pin::pin!(stream.eventsource());
    let mut answer = String::new();

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| ClientError::Stream(e.to_string()))?;
        let frame: Frame = match serde_json::from_str(&event.data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "skipping malformed event");
                continue;
            }
        };

        if let Some(error) = frame.error {
            let message = match error {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            warn!(error = %message, "server ended the stream with an error");
            return Err(ClientError::Server(message));
        }
        if let Some(text) = frame.response.filter(|t| !t.is_empty()) {
            answer.push_str(&text);
            on_update(&answer);
        }
        if frame.done == Some(true) {
            debug!(answer_len = answer.len(), "stream finished");
        }
    }

    Ok(answer)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use futures::stream;

    use super::*;

    fn chunks(
        parts: &[&'static str],
    ) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + use<> {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn accumulates_response_fragments() {
        let mut updates = Vec::new();
        let answer = consume_event_stream(
            chunks(&[
                "data: {\"response\":\"Hel\"}\n\ndata: {\"response\":\"lo\"}\n\ndata: {\"done\":true}\n\n",
            ]),
            |text| updates.push(text.to_string()),
        )
        .await
        .unwrap();

        assert_eq!(answer, "Hello");
        assert_eq!(updates, vec!["Hel", "Hello"]);
    }

    #[tokio::test]
    async fn frames_split_across_reads() {
        let answer = consume_event_stream(
            chunks(&["da", "ta: {\"respon", "se\":\"Hel\"}\n", "\ndata: {\"response\":\"lo\"}\n\n"]),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(answer, "Hello");
    }

    #[tokio::test]
    async fn malformed_and_empty_frames_are_skipped() {
        let mut updates = 0;
        let answer = consume_event_stream(
            chunks(&[
                "data: {\"response\":\"a\"}\n\n",
                "data: not json\n\n",
                "data: {\"response\":\"\"}\n\n",
                ": comment\n\n",
                "data: {\"response\":\"b\"}\n\n",
            ]),
            |_| updates += 1,
        )
        .await
        .unwrap();
        assert_eq!(answer, "ab");
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn error_frame_fails() {
        let err = consume_event_stream(
            chunks(&["data: {\"response\":\"par\"}\n\ndata: {\"error\":\"boom\",\"done\":true}\n\n"]),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Server(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn transport_error_fails() {
        let parts: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"response\":\"par\"}\n\n")),
            Err(std::io::Error::other("reset")),
        ];
        let err = consume_event_stream(stream::iter(parts), |_| {}).await.unwrap_err();
        assert!(matches!(err, ClientError::Stream(_)));
    }
}
