//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                                   - Service banner
//! GET  /health                             - Liveness check
//! GET  /health/ready                       - Readiness check (catalog loaded)
//!
//! # API (prefix /api/v1)
//! GET  /api/v1/health                      - Health check
//! GET  /api/v1/health/detailed             - Component status
//! POST /api/v1/emails/classify             - Classify one email
//! POST /api/v1/emails/process              - Classify, apply order, respond
//! POST /api/v1/emails/batch                - Process a list of emails in order
//! POST /api/v1/emails/respond              - Respond using a supplied category
//! POST /api/v1/search                      - Product search
//! GET  /api/v1/search/similar/{product_id} - Products similar to one
//! GET  /api/v1/products                    - Stock view
//! GET  /api/v1/products/{product_id}       - One product
//! GET  /api/v1/routes                      - This listing as JSON
//! ```

pub mod emails;
pub mod health;
pub mod products;
pub mod search;

use axum::{Json, Router, extract::FromRequest, routing::get};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejections use the API error format.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Prefix for every API route.
pub const API_PREFIX: &str = "/api/v1";

/// One entry of the route listing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

const fn route(method: &'static str, path: &'static str, description: &'static str) -> RouteInfo {
    RouteInfo {
        method,
        path,
        description,
    }
}

/// Every route the service exposes.
pub const ROUTES: &[RouteInfo] = &[
    route("GET", "/", "Service banner"),
    route("GET", "/health", "Liveness check"),
    route("GET", "/health/ready", "Readiness check"),
    route("GET", "/api/v1/health", "Health check"),
    route("GET", "/api/v1/health/detailed", "Component status"),
    route("POST", "/api/v1/emails/classify", "Classify one email"),
    route("POST", "/api/v1/emails/process", "Classify, apply order, and respond"),
    route("POST", "/api/v1/emails/batch", "Process a list of emails in order"),
    route("POST", "/api/v1/emails/respond", "Respond using a supplied category"),
    route("POST", "/api/v1/search", "Product search"),
    route("GET", "/api/v1/search/similar/{product_id}", "Products similar to one"),
    route("GET", "/api/v1/products", "Stock view"),
    route("GET", "/api/v1/products/{product_id}", "One product"),
    route("GET", "/api/v1/routes", "Route listing"),
];

/// Create the `/api/v1` router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::api_routes())
        .nest("/emails", emails::router())
        .nest("/search", search::router())
        .nest("/products", products::router())
        .route("/routes", get(list_routes))
}

/// Create the full router: top-level routes plus the API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .merge(health::router())
        .nest(API_PREFIX, api_routes())
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
    status: &'static str,
}

/// GET /
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "mailsort email processing service",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

#[derive(Debug, Serialize)]
struct RoutesResponse {
    routes: &'static [RouteInfo],
}

/// GET /api/v1/routes
async fn list_routes() -> Json<RoutesResponse> {
    Json(RoutesResponse { routes: ROUTES })
}
