//! Product search endpoints.

use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::retrieval::SearchHit;
use crate::state::AppState;

use super::ApiJson;

pub const MAX_QUERY_CHARS: usize = 500;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_SIMILAR_LIMIT: usize = 5;

/// Create the `/search` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(search))
        .route("/similar/{product_id}", get(similar))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_count: usize,
    /// Whether these results were ranked by the vector store.
    pub semantic: bool,
    pub search_time_ms: u64,
}

/// Check a limit against `1..=MAX_LIMIT`, applying the default when absent.
///
/// # Errors
///
/// Returns `BadRequest` when the limit is out of range.
pub fn validate_limit(limit: Option<usize>, default: usize) -> Result<usize> {
    let limit = limit.unwrap_or(default);
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )))
    }
}

/// POST /api/v1/search
#[instrument(skip_all)]
async fn search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let started = Instant::now();
    let query = request.query.trim().to_string();
    let chars = query.chars().count();
    if chars == 0 || chars > MAX_QUERY_CHARS {
        return Err(AppError::BadRequest(format!(
            "query must be 1 to {MAX_QUERY_CHARS} characters"
        )));
    }
    let limit = validate_limit(request.limit, DEFAULT_SEARCH_LIMIT)?;

    let products = state.inventory().read().await.products().to_vec();
    let found = state.matcher().search(&query, limit, &products).await;
    let search_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    info!(
        results = found.hits.len(),
        semantic = found.semantic,
        search_time_ms,
        "Search complete"
    );
    Ok(Json(SearchResponse {
        query,
        total_count: found.hits.len(),
        results: found.hits,
        semantic: found.semantic,
        search_time_ms,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub product_id: String,
    pub similar: Vec<SearchHit>,
    pub count: usize,
}

/// GET /api/v1/search/similar/{product_id}
#[instrument(skip(state, query))]
async fn similar(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<SimilarResponse>> {
    let limit = validate_limit(query.limit, DEFAULT_SIMILAR_LIMIT)?;

    let inventory = state.inventory().read().await;
    let similar = state
        .matcher()
        .similar_to(&product_id, limit, inventory.products())
        .ok_or_else(|| AppError::NotFound(format!("product {product_id} not found")))?;

    Ok(Json(SimilarResponse {
        product_id,
        count: similar.len(),
        similar,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_limit() {
        assert!(matches!(validate_limit(None, 10), Ok(10)));
        assert!(matches!(validate_limit(Some(50), 10), Ok(50)));
        assert!(validate_limit(Some(0), 10).is_err());
        assert!(validate_limit(Some(51), 10).is_err());
    }
}
