//! API key check.
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - Key to check
//! - `OPENAI_BASE_URL` - Format rules only apply to the public OpenAI host

use mailsort_service::config::{mask_secret, validate_api_key_format};
use mailsort_service::openai::{CompletionOptions, OpenAiClient, OpenAiError};
use secrecy::ExposeSecret;
use tracing::{info, warn};

const TEST_MAX_TOKENS: u32 = 5;

/// Validate the key format, then make a tiny completion.
///
/// # Errors
///
/// Returns an error if no key is configured, the format is wrong for the
/// public host, or the test completion fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(false)?;
    let openai = config.openai().ok_or("OPENAI_API_KEY not set")?;
    let key = openai.api_key.expose_secret();

    info!(key = %mask_secret(key), base_url = %openai.base_url, "Checking API key");

    if openai.is_public_openai() {
        validate_api_key_format(key)?;
        info!("Key format looks valid");
    } else {
        warn!("Custom base URL, skipping key format rules");
    }

    let client = OpenAiClient::new(openai)?;
    match client
        .complete(
            "You are a connectivity check.",
            "Reply with OK.",
            CompletionOptions::text(0.0, TEST_MAX_TOKENS),
        )
        .await
    {
        Ok(reply) => {
            info!(model = client.model(), reply = %reply.trim(), "API key works");
            Ok(())
        }
        Err(OpenAiError::Unauthorized(message)) => {
            Err(format!("API key was rejected: {message}").into())
        }
        Err(e) => Err(format!("test completion failed: {e}").into()),
    }
}
