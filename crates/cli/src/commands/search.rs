//! Product search and vector store maintenance.

use std::path::PathBuf;

use mailsort_service::retrieval::{EmbeddingClient, ProductMatcher};
use mailsort_service::state::build_matcher;
use tracing::info;

/// Search the catalog and print the hits as JSON.
///
/// Uses the vector store when embeddings are configured, lexical scoring
/// otherwise.
///
/// # Errors
///
/// Returns an error if configuration or the catalog cannot be loaded.
pub async fn search(
    query: &str,
    limit: usize,
    products: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if query.trim().is_empty() {
        return Err("query must not be empty".into());
    }

    let config = super::load_config(false)?;
    let products = super::load_products(&config, products).await?;
    let matcher = build_matcher(&config, &products).await;

    let results = matcher.search(query, limit.max(1), &products).await;
    info!(
        results = results.hits.len(),
        semantic = results.semantic,
        "Search complete"
    );

    let output = serde_json::to_string_pretty(&results.hits)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}

/// Embed every product and overwrite the vector store file.
///
/// # Errors
///
/// Returns an error if no API key is configured, the catalog cannot be
/// loaded, or the embeddings request fails.
pub async fn index(products: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(false)?;
    let openai = config.openai().ok_or("OPENAI_API_KEY not set")?;
    let products = super::load_products(&config, products).await?;

    let client = EmbeddingClient::new(openai)?;
    let store = ProductMatcher::build_index(&client, &products).await?;
    let path = &config.retrieval.vector_store_path;
    store.save(path)?;

    info!(
        entries = store.len(),
        dimensions = store.dimensions(),
        model = store.model(),
        path = %path.display(),
        "Vector store saved"
    );
    Ok(())
}
