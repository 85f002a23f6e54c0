//! Mailsort service library.
//!
//! Classifies customer emails, applies order requests against an in-memory
//! stock table, and writes replies. The same pipeline backs the HTTP API in
//! the `mailsort-service` binary and the batch commands in the CLI.
//!
//! Every stage that calls the LLM has a local fallback (keyword
//! classification, regex order extraction, lexical product search, template
//! responses), so the service runs without an API key.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod openai;
pub mod retrieval;
pub mod routes;
pub mod services;
pub mod sheets;
pub mod state;

use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use state::AppState;

/// Build the application router with CORS and request tracing.
///
/// Sentry layers are added by the binary so tests can use the router alone.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mailsort_core::Inventory;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServiceConfig;
    use crate::retrieval::ProductMatcher;
    use crate::services::EmailProcessor;
    use crate::sheets::sample_products;

    fn state(inventory: Inventory) -> AppState {
        AppState::new(
            ServiceConfig::default(),
            EmailProcessor::offline(),
            ProductMatcher::lexical(),
            inventory,
            false,
        )
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_readiness_requires_catalog() {
        let empty = app(state(Inventory::new(Vec::new()).unwrap()));
        let (status, _) = get(empty, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let loaded = app(state(Inventory::new(sample_products()).unwrap()));
        let (status, _) = get(loaded, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_product_detail_is_case_insensitive() {
        let router = app(state(Inventory::new(sample_products()).unwrap()));
        let (status, json) = get(router, "/api/v1/products/lth0976").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "LTH0976");
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let router = app(state(Inventory::new(sample_products()).unwrap()));
        let (status, json) = get(router, "/api/v1/search/similar/NOP0000").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "not_found");
    }
}
