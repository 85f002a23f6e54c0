//! Stock view.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use mailsort_core::Product;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the `/products` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{product_id}", get(detail))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    /// Only products with stock left.
    #[serde(default)]
    pub in_stock: bool,
    /// Case-insensitive category match.
    #[serde(default)]
    pub category: Option<String>,
}

impl ProductFilter {
    fn matches(&self, product: &Product) -> bool {
        if self.in_stock && product.stock == 0 {
            return false;
        }
        match &self.category {
            Some(wanted) => product
                .category
                .as_deref()
                .is_some_and(|category| category.eq_ignore_ascii_case(wanted.trim())),
            None => true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<Product>,
    pub count: usize,
    pub units_in_stock: u64,
}

/// GET /api/v1/products
async fn list(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Json<ProductList> {
    let inventory = state.inventory().read().await;
    let products: Vec<Product> = inventory
        .products()
        .iter()
        .filter(|product| filter.matches(product))
        .cloned()
        .collect();
    let units_in_stock = products.iter().map(|p| u64::from(p.stock)).sum();

    Json(ProductList {
        count: products.len(),
        units_in_stock,
        products,
    })
}

/// GET /api/v1/products/{product_id}
async fn detail(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>> {
    state
        .inventory()
        .read()
        .await
        .get(&product_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product {product_id} not found")))
}
