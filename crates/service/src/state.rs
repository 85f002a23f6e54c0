//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use mailsort_core::{Inventory, InventoryError, Product};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::openai::{OpenAiClient, OpenAiError};
use crate::retrieval::{EmbeddingClient, ProductMatcher};
use crate::services::EmailProcessor;
use crate::sheets::{DataSource, SheetError, load_catalog};

/// Error building application state at startup.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to load products: {0}")]
    Sheet(#[from] SheetError),
    #[error("invalid product catalog: {0}")]
    Inventory(#[from] InventoryError),
    #[error("failed to create LLM client: {0}")]
    OpenAi(#[from] OpenAiError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The inventory is the only mutable piece and
/// sits behind a `RwLock` so an order's check-and-decrement is atomic.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServiceConfig,
    processor: EmailProcessor,
    matcher: ProductMatcher,
    inventory: RwLock<Inventory>,
    llm_enabled: bool,
    started: Instant,
}

impl AppState {
    /// Assemble state from already-built parts.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        processor: EmailProcessor,
        matcher: ProductMatcher,
        inventory: Inventory,
        llm_enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                processor,
                matcher,
                inventory: RwLock::new(inventory),
                llm_enabled,
                started: Instant::now(),
            }),
        }
    }

    /// Load the catalog and build clients from configuration.
    ///
    /// A vector store that cannot be loaded or built is logged and replaced
    /// by lexical matching.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or the LLM client
    /// cannot be created.
    pub async fn from_config(config: ServiceConfig) -> Result<Self, StateError> {
        let products = load_catalog(&DataSource::from_config(&config.data)).await?;
        let inventory = Inventory::new(products)?;

        let llm = config.openai().map(OpenAiClient::new).transpose()?;
        let matcher = build_matcher(&config, inventory.products()).await;
        let processor = EmailProcessor::new(llm.clone(), matcher.clone(), &config);

        info!(
            products = inventory.len(),
            llm = llm.is_some(),
            semantic_search = matcher.has_vector_store(),
            "Application state ready"
        );
        Ok(Self::new(
            config,
            processor,
            matcher,
            inventory,
            llm.is_some(),
        ))
    }

    /// Get a reference to the service configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Get a reference to the email pipeline.
    #[must_use]
    pub fn processor(&self) -> &EmailProcessor {
        &self.inner.processor
    }

    /// Get a reference to the product matcher.
    #[must_use]
    pub fn matcher(&self) -> &ProductMatcher {
        &self.inner.matcher
    }

    /// Get a reference to the shared stock table.
    #[must_use]
    pub fn inventory(&self) -> &RwLock<Inventory> {
        &self.inner.inventory
    }

    /// Whether an LLM is configured.
    #[must_use]
    pub fn llm_enabled(&self) -> bool {
        self.inner.llm_enabled
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started.elapsed().as_secs()
    }
}

/// Semantic matcher when retrieval is enabled and embeddings are reachable,
/// lexical otherwise.
pub async fn build_matcher(config: &ServiceConfig, products: &[Product]) -> ProductMatcher {
    let Some(openai) = config.openai().filter(|_| config.retrieval.enabled) else {
        return ProductMatcher::lexical();
    };

    let client = match EmbeddingClient::new(openai) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Embedding client unavailable, using lexical matching");
            return ProductMatcher::lexical();
        }
    };

    match ProductMatcher::load_or_build_index(&client, products, &config.retrieval.vector_store_path)
        .await
    {
        Ok(store) => ProductMatcher::semantic(client, store),
        Err(e) => {
            warn!(error = %e, "Vector store unavailable, using lexical matching");
            ProductMatcher::lexical()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailsort_core::ProductId;
    use rust_decimal::Decimal;

    use super::*;

    #[tokio::test]
    async fn test_build_matcher_without_llm_is_lexical() {
        let config = ServiceConfig::default();
        let matcher = build_matcher(&config, &[]).await;
        assert!(!matcher.has_vector_store());
    }

    #[tokio::test]
    async fn test_state_accessors() {
        let inventory = Inventory::new(vec![Product {
            id: ProductId::new("LTH0976"),
            name: "Leather Bifold Wallet".to_string(),
            description: String::new(),
            category: None,
            season: None,
            price: Decimal::new(2100, 2),
            stock: 4,
        }])
        .unwrap();

        let state = AppState::new(
            ServiceConfig::default(),
            EmailProcessor::offline(),
            ProductMatcher::lexical(),
            inventory,
            false,
        );
        let cloned = state.clone();
        assert!(!cloned.llm_enabled());
        assert_eq!(cloned.inventory().read().await.len(), 1);
        assert_eq!(cloned.config().port, 8000);
    }
}
