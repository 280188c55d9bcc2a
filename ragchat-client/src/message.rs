//! Chat transcript entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown in place of an answer whenever a request fails.
pub const ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, true, false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, false, false)
    }

    /// The live, still-growing assistant answer.
    pub fn streaming(content: impl Into<String>) -> Self {
        Self::new(content, false, true)
    }

    fn new(content: impl Into<String>, is_user: bool, is_streaming: bool) -> Self {
        Self { content: content.into(), is_user, timestamp: Utc::now(), is_streaming }
    }
}
