//! In-memory vector store of product embeddings.
//!
//! Small catalogs fit comfortably in memory, so search is a linear scan with
//! cosine similarity. The store can be persisted as JSON so the index does
//! not have to be rebuilt on every start.

use std::path::Path;

use mailsort_core::{Product, ProductId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::RetrievalError;

/// One embedded product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub product_id: ProductId,
    /// [`text_fingerprint`] of the text that was embedded.
    #[serde(default)]
    pub text_hash: u64,
    pub embedding: Vec<f32>,
}

/// A scored search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProduct {
    pub product_id: ProductId,
    /// Cosine similarity clamped to `[0, 1]`.
    pub score: f32,
}

/// Product embeddings for one embedding model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStore {
    model: String,
    dimensions: usize,
    entries: Vec<VectorEntry>,
}

impl VectorStore {
    /// Create an empty store for the given embedding model.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dimensions: 0,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add or replace a product's embedding of `text`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the vector length differs from the
    /// vectors already stored.
    pub fn upsert(
        &mut self,
        product_id: ProductId,
        text: &str,
        embedding: Vec<f32>,
    ) -> Result<(), RetrievalError> {
        if self.dimensions == 0 {
            self.dimensions = embedding.len();
        } else if embedding.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
                context: format!("product {product_id}"),
            });
        }

        let text_hash = text_fingerprint(text);
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.product_id.matches(product_id.as_str()))
        {
            entry.text_hash = text_hash;
            entry.embedding = embedding;
        } else {
            self.entries.push(VectorEntry {
                product_id,
                text_hash,
                embedding,
            });
        }
        Ok(())
    }

    /// Stored embedding for a product.
    #[must_use]
    pub fn embedding(&self, product_id: &ProductId) -> Option<&[f32]> {
        self.entries
            .iter()
            .find(|entry| entry.product_id.matches(product_id.as_str()))
            .map(|entry| entry.embedding.as_slice())
    }

    /// Top `limit` products by similarity to `query`, best first.
    ///
    /// Products in `exclude` are skipped. Ties keep insertion order.
    #[must_use]
    pub fn search(&self, query: &[f32], limit: usize, exclude: &[ProductId]) -> Vec<ScoredProduct> {
        if limit == 0 || query.len() != self.dimensions {
            return Vec::new();
        }

        let mut scored: Vec<ScoredProduct> = self
            .entries
            .iter()
            .filter(|entry| {
                !exclude
                    .iter()
                    .any(|id| id.matches(entry.product_id.as_str()))
            })
            .map(|entry| ScoredProduct {
                product_id: entry.product_id.clone(),
                score: cosine_similarity(query, &entry.embedding).max(0.0),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        scored
    }

    /// Whether this store was built for a different model or catalog.
    ///
    /// A product whose search text changed since it was embedded makes the
    /// store stale, as does a product added or removed.
    #[must_use]
    pub fn is_stale(&self, model: &str, products: &[Product]) -> bool {
        if self.model != model || products.len() != self.entries.len() {
            return true;
        }
        products.iter().any(|product| {
            self.entries
                .iter()
                .find(|entry| entry.product_id.matches(product.id.as_str()))
                .is_none_or(|entry| entry.text_hash != text_fingerprint(&product.search_text()))
        })
    }

    /// Load a store from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path)?;
        let store: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), entries = store.len(), "Loaded vector store");
        Ok(store)
    }

    /// Write the store to a JSON file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), RetrievalError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec(self)?)?;
        info!(path = %path.display(), entries = self.len(), "Saved vector store");
        Ok(())
    }
}

/// 64-bit FNV-1a hash of `text`, stable across builds and platforms.
#[must_use]
pub fn text_fingerprint(text: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    text.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: format!("The {name}."),
            category: Some("Accessories".to_string()),
            season: None,
            price: rust_decimal::Decimal::new(1999, 2),
            stock: 1,
        }
    }

    fn catalog() -> Vec<Product> {
        vec![
            product("A1", "Canvas Tote"),
            product("B2", "Silk Scarf"),
            product("C3", "Wool Gloves"),
        ]
    }

    fn store() -> VectorStore {
        let mut store = VectorStore::new("test-model");
        let embeddings = [vec![1.0, 0.0], vec![0.7, 0.7], vec![-1.0, 0.0]];
        for (product, embedding) in catalog().iter().zip(embeddings) {
            store
                .upsert(product.id.clone(), &product.search_text(), embedding)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_search_orders_and_clamps() {
        let hits = store().search(&[1.0, 0.0], 10, &[]);
        let ids: Vec<&str> = hits.iter().map(|h| h.product_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B2", "C3"]);
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
        assert!(hits.last().unwrap().score.abs() < f32::EPSILON);
    }

    #[test]
    fn test_search_limit_and_exclude() {
        let hits = store().search(&[1.0, 0.0], 1, &[ProductId::new("a1")]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.first().unwrap().product_id.as_str(), "B2");
    }

    #[test]
    fn test_search_wrong_dimensions_is_empty() {
        assert!(store().search(&[1.0, 0.0, 0.0], 5, &[]).is_empty());
    }

    #[test]
    fn test_upsert_replaces_and_checks_dimensions() {
        let mut store = store();
        store.upsert(ProductId::new("a1"), "tote", vec![0.0, 1.0]).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.embedding(&ProductId::new("A1")), Some([0.0, 1.0].as_slice()));

        let err = store.upsert(ProductId::new("D4"), "mug", vec![1.0]).unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_is_stale() {
        let store = store();
        let products = catalog();
        assert!(!store.is_stale("test-model", &products));
        assert!(store.is_stale("other-model", &products));
        assert!(store.is_stale("test-model", products.get(..2).unwrap()));

        let mut swapped = catalog();
        swapped.last_mut().unwrap().id = ProductId::new("Z9");
        assert!(store.is_stale("test-model", &swapped));
    }

    #[test]
    fn test_is_stale_when_search_text_changes() {
        let store = store();

        let mut edited = catalog();
        edited.get_mut(1).unwrap().description = "Hand-rolled silk, now in navy.".to_string();
        assert!(store.is_stale("test-model", &edited));

        let mut recategorised = catalog();
        recategorised.first_mut().unwrap().category = Some("Bags".to_string());
        assert!(store.is_stale("test-model", &recategorised));

        let mut restocked = catalog();
        restocked.first_mut().unwrap().stock = 40;
        assert!(!store.is_stale("test-model", &restocked));
    }

    #[test]
    fn test_entries_without_text_hash_are_stale() {
        let json = r#"{"model": "test-model", "dimensions": 2, "entries": [
            {"product_id": "A1", "embedding": [1.0, 0.0]},
            {"product_id": "B2", "embedding": [0.7, 0.7]},
            {"product_id": "C3", "embedding": [-1.0, 0.0]}
        ]}"#;
        let legacy: VectorStore = serde_json::from_str(json).unwrap();
        assert!(legacy.is_stale("test-model", &catalog()));
    }

    #[test]
    fn test_text_fingerprint() {
        assert_eq!(text_fingerprint(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(text_fingerprint("a"), 0xaf63_dc4c_8601_ec8c);
        assert_ne!(text_fingerprint("Silk Scarf"), text_fingerprint("Silk scarf"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("vectors.json");
        store().save(&path).unwrap();

        let loaded = VectorStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.model(), "test-model");
        assert_eq!(loaded.dimensions(), 2);
    }
}
