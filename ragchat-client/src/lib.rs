//! # ragchat-client
//!
//! Talks to `ragchat-server`: streams answers from `/api/ollama` as they are
//! generated and keeps the conversation transcript.
//!
//! ```rust,ignore
//! use ragchat_client::{ChatClient, ChatSession};
//!
//! let mut session = ChatSession::new(ChatClient::new("http://localhost:3001")?);
//! let reply = session.send("What do my notes say about tokio?", |live| {
//!     println!("{}", live.content);
//! }).await;
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod session;
pub mod stream;

pub use client::{ChatClient, DEFAULT_SERVER_URL, ServerStatus, UploadSummary};
pub use error::{ClientError, Result};
pub use message::{ChatMessage, ERROR_MESSAGE};
pub use session::ChatSession;
pub use stream::consume_event_stream;
