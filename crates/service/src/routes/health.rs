//! Health checks.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

/// Top-level liveness and readiness routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
}

/// Health routes under the API prefix.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    fn healthy() -> Self {
        Self {
            status: "healthy",
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }
    }
}

/// Liveness check.
///
/// Returns healthy if the server is running. Does not check dependencies.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Readiness check.
///
/// Returns 503 Service Unavailable until a product catalog is loaded.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.inventory().read().await.is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

#[derive(Debug, Serialize)]
pub struct DetailedHealth {
    #[serde(flatten)]
    pub health: HealthResponse,
    pub uptime_secs: u64,
    pub components: Components,
}

#[derive(Debug, Serialize)]
pub struct Components {
    pub llm: ComponentStatus,
    pub semantic_search: ComponentStatus,
    pub inventory: InventoryStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InventoryStatus {
    pub products: usize,
    pub units_in_stock: u64,
}

/// Component status: LLM, vector store, and the stock table.
async fn detailed(State(state): State<AppState>) -> Json<DetailedHealth> {
    let llm = if state.llm_enabled() {
        ComponentStatus {
            status: "configured",
            detail: state.config().openai().map(|openai| openai.model.clone()),
        }
    } else {
        ComponentStatus {
            status: "fallback",
            detail: Some("OPENAI_API_KEY not set".to_string()),
        }
    };

    let matcher = state.matcher();
    let semantic_search = if matcher.has_vector_store() {
        ComponentStatus {
            status: "ready",
            detail: Some(format!("{} products indexed", matcher.indexed_products())),
        }
    } else {
        ComponentStatus {
            status: "fallback",
            detail: Some("lexical matching".to_string()),
        }
    };

    let inventory = {
        let inventory = state.inventory().read().await;
        InventoryStatus {
            products: inventory.len(),
            units_in_stock: inventory.total_units(),
        }
    };

    Json(DetailedHealth {
        health: HealthResponse::healthy(),
        uptime_secs: state.uptime_secs(),
        components: Components {
            llm,
            semantic_search,
            inventory,
        },
    })
}
