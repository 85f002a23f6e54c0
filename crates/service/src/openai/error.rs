//! Error types for the OpenAI-compatible API client.

use thiserror::Error;

/// Errors that can occur when calling the chat or embeddings API.
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// HTTP request failed (connection refused, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error body.
    #[error("API error ({error_type}): {message}")]
    Api {
        /// Error type from the API.
        error_type: String,
        /// Error message.
        message: String,
    },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Failed to parse response.
    #[error("parse error: {0}")]
    Parse(String),

    /// The completion contained no text.
    #[error("completion returned no content")]
    EmptyCompletion,

    /// Client could not be constructed from configuration.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// API error response body.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorResponse {
    /// Nested error details.
    pub error: ApiError,
}

/// Nested error details.
#[derive(Debug, serde::Deserialize)]
pub struct ApiError {
    /// Error type (e.g. `invalid_request_error`).
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error code (e.g. `model_not_found`).
    #[serde(default)]
    pub code: Option<String>,
    /// Error message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_error_display() {
        let err = OpenAiError::RateLimited(20);
        assert_eq!(err.to_string(), "rate limited, retry after 20 seconds");

        let err = OpenAiError::Api {
            error_type: "invalid_request_error".to_string(),
            message: "model not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error (invalid_request_error): model not found"
        );
    }

    #[test]
    fn test_api_error_deserialization() {
        let json = r#"{
            "error": {
                "message": "The model `gpt-9` does not exist",
                "type": "invalid_request_error",
                "param": null,
                "code": "model_not_found"
            }
        }"#;

        let response: ApiErrorResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            response.error.error_type.as_deref(),
            Some("invalid_request_error")
        );
        assert_eq!(response.error.code.as_deref(), Some("model_not_found"));
        assert!(response.error.message.contains("gpt-9"));
    }

    #[test]
    fn test_api_error_without_type() {
        let json = r#"{"error": {"message": "upstream unavailable"}}"#;
        let response: ApiErrorResponse = serde_json::from_str(json).expect("deserialize");
        assert!(response.error.error_type.is_none());
    }
}
