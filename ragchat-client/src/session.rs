//! Conversation state for one chat.

use tracing::warn;

use crate::client::ChatClient;
use crate::message::{ChatMessage, ERROR_MESSAGE};

/// An append-only transcript plus the answer currently being streamed.
#[derive(Debug)]
pub struct ChatSession {
    client: ChatClient,
    messages: Vec<ChatMessage>,
    streaming: Option<ChatMessage>,
    is_loading: bool,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self { client, messages: Vec::new(), streaming: None, is_loading: false }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The partial answer while a request is in flight.
    pub fn streaming(&self) -> Option<&ChatMessage> {
        self.streaming.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Send `prompt` and stream the reply.
    ///
    /// `on_update` sees the live answer each time it grows. When the stream
    /// ends the answer is appended to the transcript; on any failure the
    /// fixed [`ERROR_MESSAGE`] is appended instead. Either way the session is
    /// no longer loading afterwards. Returns the appended reply.
    pub async fn send(
        &mut self,
        prompt: &str,
        mut on_update: impl FnMut(&ChatMessage),
    ) -> ChatMessage {
        self.messages.push(ChatMessage::user(prompt));
        self.is_loading = true;

        let streaming = &mut self.streaming;
        let outcome = self
            .client
            .ask(prompt, |text| {
                let live = streaming.insert(ChatMessage::streaming(text));
                on_update(live);
            })
            .await;

        self.streaming = None;
        self.is_loading = false;

        let reply = match outcome {
            Ok(answer) => ChatMessage::assistant(answer),
            Err(e) => {
                warn!(error = %e, "chat request failed");
                ChatMessage::assistant(ERROR_MESSAGE)
            }
        };
        self.messages.push(reply.clone());
        reply
    }
}
