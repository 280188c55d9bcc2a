//! Error types for the chat client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or its body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The event stream broke off mid-read.
    #[error("event stream failed: {0}")]
    Stream(String),

    /// The server reported an error inside the event stream.
    #[error("server reported an error: {0}")]
    Server(String),

    /// A local file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;
