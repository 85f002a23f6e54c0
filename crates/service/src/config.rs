//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## LLM (optional - unset means keyword/template fallbacks only)
//! - `OPENAI_API_KEY` - API key for chat completions and embeddings
//! - `OPENAI_BASE_URL` - OpenAI-compatible endpoint (default: <https://api.openai.com/v1>)
//! - `OPENAI_MODEL` - Chat model (default: gpt-4o)
//! - `OPENAI_MAX_TOKENS` - Response generation token cap (default: 1000)
//! - `OPENAI_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `TEMPERATURE` - Response generation temperature (default: 0.7)
//! - `EMBEDDING_MODEL` - Embeddings model (default: text-embedding-3-small)
//!
//! ## Data
//! - `PRODUCTS_CSV` - Products sheet as CSV (default: data/products.csv)
//! - `EMAILS_CSV` - Emails sheet as CSV (default: data/emails.csv)
//! - `SHEETS_DOCUMENT_ID` - Read both sheets from a public spreadsheet export instead
//! - `OUTPUT_PATH` - Workbook path (default: output.xlsx)
//!
//! ## Retrieval
//! - `RAG_ENABLED` - Build or load product embeddings (default: true)
//! - `VECTOR_STORE_PATH` - Precomputed embeddings file (default: ./vector_store.json)
//!
//! ## Server
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8000)
//! - `MAX_EMAIL_LENGTH` - Subject plus body limit in characters (default: 10000)
//! - `LOG_FORMAT` - `text` or `json` (default: text)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const MIN_API_KEY_LENGTH: usize = 20;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// LLM configuration (`None` runs every stage on its fallback path)
    pub openai: Option<OpenAiConfig>,
    /// Input and output locations
    pub data: DataConfig,
    /// Product embedding settings
    pub retrieval: RetrievalConfig,
    /// Maximum subject plus body length accepted by the API, in characters
    pub max_email_length: usize,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            openai: None,
            data: DataConfig::default(),
            retrieval: RetrievalConfig::default(),
            max_email_length: 10_000,
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }
}

/// OpenAI-compatible API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: SecretString,
    /// Base URL without a trailing slash (e.g., <https://api.openai.com/v1>)
    pub base_url: String,
    /// Chat model ID
    pub model: String,
    /// Embedding model ID
    pub embedding_model: String,
    /// Temperature for response generation
    pub temperature: f32,
    /// Token cap for response generation
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiConfig {
    /// Configuration with default models pointing at `base_url`.
    #[must_use]
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 30,
        }
    }

    /// Whether requests go to the public OpenAI host.
    #[must_use]
    pub fn is_public_openai(&self) -> bool {
        self.base_url.starts_with(DEFAULT_OPENAI_BASE_URL)
    }

    /// Load configuration from environment.
    ///
    /// Returns `Ok(None)` if `OPENAI_API_KEY` is not set. Key problems are
    /// logged as warnings, never rejected.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key) = get_optional_env("OPENAI_API_KEY") else {
            return Ok(None);
        };

        if let Err(e) = validate_secret_strength(&key, "OPENAI_API_KEY") {
            tracing::warn!("OPENAI_API_KEY validation warning: {e}");
        }

        let mut config = Self::new(
            SecretString::from(key.clone()),
            get_env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        );
        config.model = get_env_or_default("OPENAI_MODEL", DEFAULT_CHAT_MODEL);
        config.embedding_model = get_env_or_default("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL);
        config.temperature = get_parsed_env("TEMPERATURE", config.temperature)?;
        config.max_tokens = get_parsed_env("OPENAI_MAX_TOKENS", config.max_tokens)?;
        config.timeout_secs = get_parsed_env("OPENAI_TIMEOUT_SECS", config.timeout_secs)?;

        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(ConfigError::InvalidEnvVar(
                "TEMPERATURE".to_string(),
                format!("must be between 0.0 and 2.0 (got {})", config.temperature),
            ));
        }

        if config.is_public_openai() {
            if let Err(e) = validate_api_key_format(&key) {
                tracing::warn!("OPENAI_API_KEY format warning: {e}");
            }
        }

        Ok(Some(config))
    }
}

/// Input and output locations.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Products CSV path
    pub products_csv: PathBuf,
    /// Emails CSV path
    pub emails_csv: PathBuf,
    /// Spreadsheet document ID; when set, sheets are fetched instead of read from disk
    pub sheets_document_id: Option<String>,
    /// Workbook output path
    pub output_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            products_csv: PathBuf::from("data/products.csv"),
            emails_csv: PathBuf::from("data/emails.csv"),
            sheets_document_id: None,
            output_path: PathBuf::from("output.xlsx"),
        }
    }
}

impl DataConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            products_csv: get_optional_env("PRODUCTS_CSV").map_or(defaults.products_csv, PathBuf::from),
            emails_csv: get_optional_env("EMAILS_CSV").map_or(defaults.emails_csv, PathBuf::from),
            sheets_document_id: get_optional_env("SHEETS_DOCUMENT_ID"),
            output_path: get_optional_env("OUTPUT_PATH").map_or(defaults.output_path, PathBuf::from),
        }
    }
}

/// Product embedding settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Whether to build or load product embeddings
    pub enabled: bool,
    /// Where precomputed embeddings are stored
    pub vector_store_path: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vector_store_path: PathBuf::from("./vector_store.json"),
        }
    }
}

impl RetrievalConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: get_bool_env("RAG_ENABLED", defaults.enabled)?,
            vector_store_path: get_optional_env("VECTOR_STORE_PATH")
                .map_or(defaults.vector_store_path, PathBuf::from),
        })
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let host = get_env_or_default("HOST", "0.0.0.0")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("HOST".to_string(), e.to_string()))?;
        let port = get_parsed_env("PORT", defaults.port)?;
        let max_email_length = get_parsed_env("MAX_EMAIL_LENGTH", defaults.max_email_length)?;
        let log_format = get_parsed_env("LOG_FORMAT", defaults.log_format)?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.sentry_sample_rate);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.sentry_traces_sample_rate);

        Ok(Self {
            host,
            port,
            openai: OpenAiConfig::from_env()?,
            data: DataConfig::from_env(),
            retrieval: RetrievalConfig::from_env()?,
            max_email_length,
            log_format,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Returns a reference to the LLM configuration, if available.
    ///
    /// Returns `None` if `OPENAI_API_KEY` was not set, which puts
    /// classification, extraction, and responses on their fallback paths.
    #[must_use]
    pub const fn openai(&self) -> Option<&OpenAiConfig> {
        self.openai.as_ref()
    }
}

// =============================================================================
// API Key Checks
// =============================================================================

/// Check that a key looks like an `OpenAI` secret key.
///
/// The key must start with `sk-`, be at least 20 characters long, and contain
/// only ASCII letters, digits, `-` and `_`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` describing the first failed rule.
pub fn validate_api_key_format(key: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("OPENAI_API_KEY".to_string(), reason);

    if !key.starts_with("sk-") {
        return Err(invalid("must start with 'sk-'".to_string()));
    }
    if key.len() < MIN_API_KEY_LENGTH {
        return Err(invalid(format!(
            "must be at least {MIN_API_KEY_LENGTH} characters (got {})",
            key.len()
        )));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(invalid(format!("contains invalid character {bad:?}")));
    }
    Ok(())
}

/// Mask a secret for display: first 8 and last 4 characters.
///
/// Secrets of 12 characters or fewer are fully masked.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars.iter().take(8).collect();
    let tail: String = chars.iter().skip(chars.len() - 4).collect();
    format!("{head}...{tail}")
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| {
        parse_bool(&raw).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got '{raw}'"))
        })
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("sk-your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("sk-aaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("sk-proj-Qx7Lm2Vt9Rb4Kd8Hn3Wz6Yc1", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_api_key_format() {
        assert!(validate_api_key_format("sk-proj-Qx7Lm2Vt9Rb4Kd8Hn3Wz6Yc1").is_ok());
        assert!(validate_api_key_format("pk-proj-Qx7Lm2Vt9Rb4Kd8Hn3Wz6Yc1").is_err());
        assert!(validate_api_key_format("sk-short").is_err());
        assert!(validate_api_key_format("sk-proj-Qx7Lm2Vt9Rb4Kd8Hn3 Wz6Yc1").is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(
            mask_secret("sk-proj-Qx7Lm2Vt9Rb4Kd8Hn3Wz6Yc1"),
            "sk-proj-...6Yc1"
        );
        assert_eq!(mask_secret("short"), "*****");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_socket_addr_defaults() {
        let config = ServiceConfig::default();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
        assert_eq!(addr.port(), 8000);
        assert!(config.openai().is_none());
        assert!(config.retrieval.enabled);
    }

    #[test]
    fn test_openai_config_trims_trailing_slash() {
        let config = OpenAiConfig::new(SecretString::from("sk-test"), "http://127.0.0.1:9999/v1/");
        assert_eq!(config.base_url, "http://127.0.0.1:9999/v1");
        assert!(!config.is_public_openai());
    }

    #[test]
    fn test_openai_config_debug_redacts_secrets() {
        let config = OpenAiConfig::new(
            SecretString::from("sk-super-secret-key-value"),
            DEFAULT_OPENAI_BASE_URL,
        );

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains(DEFAULT_CHAT_MODEL));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk-super-secret-key-value"));
    }
}
