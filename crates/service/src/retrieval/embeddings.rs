//! Embedding client for semantic product search.
//!
//! Calls the `/embeddings` endpoint of an OpenAI-compatible API. Query
//! embeddings are cached in memory so repeated searches for the same text
//! (common with the search API) cost one request.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::OpenAiConfig;
use crate::openai::{build_http_client, error_from_response};

use super::RetrievalError;

const QUERY_CACHE_CAPACITY: u64 = 1_000;
const QUERY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Client for generating text embeddings.
#[derive(Clone)]
pub struct EmbeddingClient {
    inner: Arc<EmbeddingClientInner>,
}

struct EmbeddingClientInner {
    client: reqwest::Client,
    embeddings_url: String,
    model: String,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl EmbeddingClient {
    /// Create a new embedding client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &OpenAiConfig) -> Result<Self, RetrievalError> {
        let client = build_http_client(&config.api_key, config.timeout_secs)?;
        let cache = Cache::builder()
            .max_capacity(QUERY_CACHE_CAPACITY)
            .time_to_live(QUERY_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(EmbeddingClientInner {
                client,
                embeddings_url: format!("{}/embeddings", config.base_url),
                model: config.embedding_model.clone(),
                cache,
            }),
        })
    }

    /// Embedding model name, recorded alongside stored vectors.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Generate an embedding vector for the given text, using the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails or returns an invalid response.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>, RetrievalError> {
        let key = text.trim().to_lowercase();
        if let Some(hit) = self.inner.cache.get(&key).await {
            return Ok(hit);
        }

        let embedding = self
            .embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RetrievalError::InvalidResponse("No embedding data in response".to_string())
            })?;

        let embedding = Arc::new(embedding);
        self.inner.cache.insert(key, Arc::clone(&embedding)).await;
        Ok(embedding)
    }

    /// Generate embeddings for multiple texts in a single request.
    ///
    /// Results are returned in input order regardless of the order the API
    /// lists them in.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails, the count does not match,
    /// or vectors have inconsistent dimensions.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.inner.model,
            input: texts.to_vec(),
        };

        let response = self
            .inner
            .client
            .post(&self.inner.embeddings_url)
            .json(&request)
            .send()
            .await
            .map_err(crate::openai::OpenAiError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(status, response).await.into());
        }

        let body = response
            .text()
            .await
            .map_err(crate::openai::OpenAiError::from)?;
        let response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RetrievalError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        order_embeddings(response.data, texts.len())
    }
}

/// Sort by `index`, then check count and dimensions.
fn order_embeddings(
    mut data: Vec<EmbeddingData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, RetrievalError> {
    data.sort_by_key(|d| d.index);
    let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

    if embeddings.len() != expected {
        return Err(RetrievalError::InvalidResponse(format!(
            "Expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }

    let dimensions = embeddings.first().map_or(0, Vec::len);
    if dimensions == 0 {
        return Err(RetrievalError::InvalidResponse(
            "Embedding has zero dimensions".to_string(),
        ));
    }

    for (i, emb) in embeddings.iter().enumerate() {
        if emb.len() != dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimensions,
                actual: emb.len(),
                context: format!("embedding {i} in batch"),
            });
        }
    }

    Ok(embeddings)
}

/// Request body for `/embeddings`.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// Response from `/embeddings`.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Single embedding in a response.
#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(index: usize, embedding: Vec<f32>) -> EmbeddingData {
        EmbeddingData { index, embedding }
    }

    #[test]
    fn test_order_embeddings_sorts_by_index() {
        let ordered = order_embeddings(
            vec![data(1, vec![0.0, 1.0]), data(0, vec![1.0, 0.0])],
            2,
        )
        .expect("ordered");
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_order_embeddings_count_mismatch() {
        let result = order_embeddings(vec![data(0, vec![1.0])], 2);
        assert!(matches!(result, Err(RetrievalError::InvalidResponse(_))));
    }

    #[test]
    fn test_order_embeddings_dimension_mismatch() {
        let result = order_embeddings(vec![data(0, vec![1.0, 0.0]), data(1, vec![1.0])], 2);
        assert!(matches!(
            result,
            Err(RetrievalError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2]}],
            "model": "text-embedding-3-small"
        }"#;
        let response: EmbeddingResponse = serde_json::from_str(json).expect("deserialize");
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data.first().map(|d| d.embedding.len()), Some(2));
    }
}
