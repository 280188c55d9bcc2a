//! Error types for the `ragchat-rag` crate.

use thiserror::Error;

/// Errors that can occur while chunking, embedding, indexing or retrieving.
#[derive(Debug, Error)]
pub enum RagError {
    /// The upstream service refused the connection or could not be reached.
    #[error("{service} is unavailable: {message}")]
    UpstreamUnavailable {
        /// The external service that could not be reached.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// The upstream service did not answer within the configured bound.
    #[error("{service} timed out: {message}")]
    UpstreamTimeout {
        /// The external service that timed out.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// The upstream service answered with a non-success response.
    #[error("{service} returned an error{}: {message}", status_suffix(.status))]
    UpstreamError {
        /// The external service that produced the error.
        service: String,
        /// HTTP status, when the failure came from a response.
        status: Option<u16>,
        /// A description of the failure.
        message: String,
    },

    /// The vector index was used before its collection was ready.
    #[error("Vector store not initialized. Please ensure the vector database is running.")]
    NotInitialized,

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied input that cannot be processed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RagError {
    /// Classify a transport-level `reqwest` failure against `service`.
    ///
    /// Timeouts and connection failures get their own variants so callers
    /// can tell "not ready" apart from "too slow" and from everything else.
    pub fn from_transport(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RagError::UpstreamTimeout { service: service.to_string(), message: err.to_string() }
        } else if err.is_connect() {
            RagError::UpstreamUnavailable { service: service.to_string(), message: err.to_string() }
        } else {
            RagError::UpstreamError {
                service: service.to_string(),
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }

    /// Build an [`RagError::UpstreamError`] from a non-success status and body.
    pub fn upstream_status(service: &str, status: u16, body: impl Into<String>) -> Self {
        RagError::UpstreamError {
            service: service.to_string(),
            status: Some(status),
            message: body.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
