//! OpenAI-compatible chat completions client.
//!
//! Every stage that calls the LLM treats any [`OpenAiError`] as a signal to
//! use its local fallback; nothing here retries.

mod client;
mod error;
mod types;

pub use client::OpenAiClient;
pub(crate) use client::{build_http_client, error_from_response};
pub use error::{ApiError, ApiErrorResponse, OpenAiError};
pub use types::{ChatResponse, CompletionOptions, Message, Role, Usage};
