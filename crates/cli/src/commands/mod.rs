//! Command implementations.

pub mod check_key;
pub mod classify;
pub mod process;
pub mod sample_data;
pub mod search;

use std::path::PathBuf;

use mailsort_core::Product;
use mailsort_service::config::ServiceConfig;
use mailsort_service::openai::OpenAiClient;
use mailsort_service::sheets::{DataSource, load_catalog};

/// Load configuration, optionally dropping the LLM.
pub fn load_config(offline: bool) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::from_env()?;
    if offline {
        config.openai = None;
    }
    Ok(config)
}

/// The chat client, when an API key is configured.
pub fn llm_client(config: &ServiceConfig) -> Result<Option<OpenAiClient>, Box<dyn std::error::Error>> {
    Ok(config.openai().map(OpenAiClient::new).transpose()?)
}

/// Load the catalog from `products` or the configured source.
pub async fn load_products(
    config: &ServiceConfig,
    products: Option<PathBuf>,
) -> Result<Vec<Product>, Box<dyn std::error::Error>> {
    let source = products.map_or_else(
        || DataSource::from_config(&config.data),
        |products| DataSource::Files {
            products,
            emails: config.data.emails_csv.clone(),
        },
    );
    Ok(load_catalog(&source).await?)
}
