//! ragchat-server: upload documents, then ask questions answered by a local
//! Ollama model with retrieved context, streamed back as Server-Sent Events.

pub mod config;
pub mod error;
pub mod model;
pub mod ndjson;
pub mod relay;
pub mod server;

pub use config::{ServerConfig, VectorStoreKind};
pub use error::ApiError;
pub use model::{ModelGenerator, OllamaGenerator};
pub use relay::{RelayFrame, StreamEvent};
pub use server::{AppState, app_router, run_server};
