//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragchat_rag::RagError;
use serde::Serialize;
use tracing::error;

/// A failed request, rendered as `{error, message, details}` JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self { status, error: error.into(), message: message.into(), details: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request", message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn display_name(service: &str) -> String {
    let mut chars = service.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let details = err.to_string();
        match &err {
            RagError::UpstreamUnavailable { service, .. } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{} service is not ready yet", display_name(service)),
                "Please wait a few moments and try again",
            ),
            RagError::UpstreamTimeout { service, .. } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                format!("{} service timeout", display_name(service)),
                "The request took too long to complete",
            ),
            RagError::UpstreamError { service, .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error communicating with {}", display_name(service)),
                "The upstream service rejected the request",
            ),
            RagError::NotInitialized => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "Vector store not initialized",
                "Please ensure the vector database is running",
            ),
            RagError::InvalidInput(message) => Self::bad_request(message.clone()),
            RagError::Config(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "The server is misconfigured",
            ),
        }
        .with_details(details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.error, details = ?self.details, "request failed");
        }
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connection_maps_to_503() {
        let err: ApiError = RagError::UpstreamUnavailable {
            service: "ollama".into(),
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error, "Ollama service is not ready yet");
        assert_eq!(err.message, "Please wait a few moments and try again");
        assert!(err.details.unwrap().contains("connection refused"));
    }

    #[test]
    fn timeout_maps_to_504() {
        let err: ApiError =
            RagError::UpstreamTimeout { service: "ollama".into(), message: "slow".into() }.into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error, "Ollama service timeout");
    }

    #[test]
    fn other_failures_map_to_500_or_400() {
        let upstream: ApiError = RagError::upstream_status("chroma", 422, "bad").into();
        assert_eq!(upstream.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(upstream.error, "Error communicating with Chroma");

        let not_ready: ApiError = RagError::NotInitialized.into();
        assert_eq!(not_ready.status, StatusCode::SERVICE_UNAVAILABLE);

        let invalid: ApiError = RagError::InvalidInput("empty".into()).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert_eq!(invalid.message, "empty");
    }

    #[test]
    fn body_omits_status_field() {
        let body = serde_json::to_value(ApiError::bad_request("no file")).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Invalid request", "message": "no file" }));
    }
}
