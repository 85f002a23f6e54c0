//! Chat completions client for OpenAI-compatible APIs.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use crate::config::OpenAiConfig;

use super::error::{ApiErrorResponse, OpenAiError};
use super::types::{ChatRequest, ChatResponse, CompletionOptions, Message, ResponseFormat};

/// Chat completions client.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    client: reqwest::Client,
    completions_url: String,
    model: String,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `OpenAiError::Config` if the API key contains invalid header
    /// characters, or `OpenAiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &OpenAiConfig) -> Result<Self, OpenAiError> {
        let client = build_http_client(&config.api_key, config.timeout_secs)?;

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                client,
                completions_url: format!("{}/chat/completions", config.base_url),
                model: config.model.clone(),
            }),
        })
    }

    /// Chat model used for every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Send a chat request and get the complete response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API returns an error status.
    #[instrument(skip(self, messages), fields(model = %self.inner.model, json = options.json))]
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<ChatResponse, OpenAiError> {
        let request = ChatRequest {
            model: self.inner.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json.then_some(ResponseFormat::JSON_OBJECT),
        };

        let response = self
            .inner
            .client
            .post(&self.inner.completions_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await);
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| OpenAiError::Parse(format!("Failed to parse response: {e}")))?;

        if let Some(usage) = parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        Ok(parsed)
    }

    /// Send a system and user prompt and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns `OpenAiError::EmptyCompletion` if the reply has no text, or any
    /// error from [`Self::chat`].
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        options: CompletionOptions,
    ) -> Result<String, OpenAiError> {
        let response = self
            .chat(vec![Message::system(system), Message::user(user)], options)
            .await?;

        response
            .text()
            .map(str::to_string)
            .ok_or(OpenAiError::EmptyCompletion)
    }
}

/// Build an HTTP client with bearer auth and a request timeout.
pub(crate) fn build_http_client(
    api_key: &SecretString,
    timeout_secs: u64,
) -> Result<reqwest::Client, OpenAiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
        .map_err(|_| OpenAiError::Config("API key contains invalid header characters".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Map an error status to an `OpenAiError`.
pub(crate) async fn error_from_response(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> OpenAiError {
    // Check for rate limiting
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return OpenAiError::RateLimited(retry_after);
    }

    // Check for unauthorized
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return OpenAiError::Unauthorized("Invalid API key".to_string());
    }

    // Try to parse API error response
    match response.text().await {
        Ok(body) => {
            if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                OpenAiError::Api {
                    error_type: api_error
                        .error
                        .error_type
                        .or(api_error.error.code)
                        .unwrap_or_else(|| status.as_u16().to_string()),
                    message: api_error.error.message,
                }
            } else {
                OpenAiError::Api {
                    error_type: status.as_u16().to_string(),
                    message: body,
                }
            }
        }
        Err(e) => OpenAiError::Http(e),
    }
}
