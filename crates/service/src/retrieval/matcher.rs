//! Product matching and similarity search.
//!
//! Resolves a free-text product reference to a catalog product by trying, in
//! order: exact ID, name containment, fuzzy name similarity, and finally a
//! nearest-neighbour lookup in the vector store.

use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use mailsort_core::{Product, ProductId};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::{EmbeddingClient, RetrievalError, VectorStore};

/// Minimum normalised Levenshtein similarity for a fuzzy name match.
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// Minimum cosine similarity for a semantic match.
pub const SEMANTIC_THRESHOLD: f32 = 0.5;

/// Shortest product ID that may be found inside running text.
const MIN_EMBEDDED_ID_LEN: usize = 4;

/// Products embedded per API request when building the index.
const INDEX_BATCH_SIZE: usize = 100;

/// Product codes like `LTH0976`, `CBT 89 01` or `RSG-8901`.
static PRODUCT_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]{3})[\s-]?(\d{2})\s?(\d{2,3})\b").expect("Invalid regex")
});

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]{2,}").expect("Invalid regex"));

/// How a reference was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    ExactId,
    NameContains,
    Fuzzy,
    Semantic,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactId => write!(f, "exact_id"),
            Self::NameContains => write!(f, "name_contains"),
            Self::Fuzzy => write!(f, "fuzzy"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// A resolved product reference.
#[derive(Debug, Clone)]
pub struct ProductMatch {
    pub product: Product,
    pub kind: MatchKind,
    pub score: f32,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub product: Product,
    /// Similarity in `[0, 1]`.
    pub score: f32,
}

/// Ranked hits plus the path that produced them.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Whether the hits were ranked by the vector store rather than lexically.
    pub semantic: bool,
}

/// Resolves product references against a catalog snapshot.
///
/// Cheap to clone. The vector store is optional; without it, matching stops
/// after the fuzzy step and search uses lexical scoring.
#[derive(Clone, Default)]
pub struct ProductMatcher {
    embeddings: Option<EmbeddingClient>,
    store: Option<Arc<VectorStore>>,
}

impl ProductMatcher {
    /// Matcher without semantic search.
    #[must_use]
    pub fn lexical() -> Self {
        Self::default()
    }

    /// Matcher backed by an embedding client and a populated vector store.
    #[must_use]
    pub fn semantic(embeddings: EmbeddingClient, store: VectorStore) -> Self {
        Self {
            embeddings: Some(embeddings),
            store: Some(Arc::new(store)),
        }
    }

    /// Whether a vector store is loaded.
    #[must_use]
    pub fn has_vector_store(&self) -> bool {
        self.store.as_ref().is_some_and(|store| !store.is_empty())
    }

    /// Number of indexed products.
    #[must_use]
    pub fn indexed_products(&self) -> usize {
        self.store.as_ref().map_or(0, |store| store.len())
    }

    /// Resolve a reference to the best-matching product.
    #[instrument(skip(self, products), fields(reference = %reference))]
    pub async fn find(&self, reference: &str, products: &[Product]) -> Option<ProductMatch> {
        if let Some(found) = match_lexical(reference, products) {
            debug!(product_id = %found.product.id, kind = %found.kind, "Matched product");
            return Some(found);
        }

        let (client, store) = self.embeddings.as_ref().zip(self.store.as_ref())?;
        let query = match client.embed(reference).await {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Embedding lookup failed, no semantic match");
                return None;
            }
        };

        store
            .search(&query, 1, &[])
            .into_iter()
            .filter(|hit| hit.score >= SEMANTIC_THRESHOLD)
            .find_map(|hit| {
                find_by_id(products, hit.product_id.as_str()).map(|product| ProductMatch {
                    product: product.clone(),
                    kind: MatchKind::Semantic,
                    score: hit.score,
                })
            })
    }

    /// Products ranked by similarity to `query`, best first.
    ///
    /// Uses the vector store when available and falls back to lexical
    /// scoring if there is none or the embedding call fails.
    #[instrument(skip(self, products), fields(query_len = query.len()))]
    pub async fn search(&self, query: &str, limit: usize, products: &[Product]) -> SearchResults {
        if let Some((client, store)) = self.embeddings.as_ref().zip(self.store.as_ref()) {
            match client.embed(query).await {
                Ok(embedding) => {
                    return SearchResults {
                        hits: resolve_hits(store.search(&embedding, limit, &[]), products),
                        semantic: true,
                    };
                }
                Err(e) => warn!(error = %e, "Semantic search failed, using lexical search"),
            }
        }
        SearchResults {
            hits: lexical_search(query, limit, products, None),
            semantic: false,
        }
    }

    /// Products most similar to the given one, excluding itself.
    ///
    /// Returns `None` if the product is not in the catalog.
    #[must_use]
    pub fn similar_to(
        &self,
        product_id: &str,
        limit: usize,
        products: &[Product],
    ) -> Option<Vec<SearchHit>> {
        let product = find_by_id(products, product_id)?;

        if let Some(store) = &self.store {
            if let Some(embedding) = store.embedding(&product.id) {
                let hits = store.search(embedding, limit, std::slice::from_ref(&product.id));
                return Some(resolve_hits(hits, products));
            }
        }

        Some(lexical_search(
            &product.search_text(),
            limit,
            products,
            Some(&product.id),
        ))
    }

    /// Load the vector store from `path`, or build and save it when missing
    /// or stale.
    ///
    /// # Errors
    ///
    /// Returns an error if embeddings cannot be computed or the file cannot
    /// be written.
    pub async fn load_or_build_index(
        client: &EmbeddingClient,
        products: &[Product],
        path: &Path,
    ) -> Result<VectorStore, RetrievalError> {
        if path.exists() {
            match VectorStore::load(path) {
                Ok(store) if !store.is_stale(client.model(), products) => {
                    info!(entries = store.len(), "Using existing vector store");
                    return Ok(store);
                }
                Ok(_) => info!("Vector store is stale, rebuilding"),
                Err(e) => warn!(error = %e, "Could not read vector store, rebuilding"),
            }
        }

        let store = Self::build_index(client, products).await?;
        store.save(path)?;
        Ok(store)
    }

    /// Embed every product's search text.
    ///
    /// # Errors
    ///
    /// Returns an error if any embeddings request fails.
    #[instrument(skip_all, fields(products = products.len()))]
    pub async fn build_index(
        client: &EmbeddingClient,
        products: &[Product],
    ) -> Result<VectorStore, RetrievalError> {
        let mut store = VectorStore::new(client.model());

        for chunk in products.chunks(INDEX_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(Product::search_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let embeddings = client.embed_batch(&refs).await?;
            for ((product, text), embedding) in chunk.iter().zip(&texts).zip(embeddings) {
                store.upsert(product.id.clone(), text, embedding)?;
            }
        }

        info!(entries = store.len(), dimensions = store.dimensions(), "Built vector store");
        Ok(store)
    }
}

/// Exact ID, name containment, then fuzzy name matching.
#[must_use]
pub fn match_lexical(reference: &str, products: &[Product]) -> Option<ProductMatch> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    match_exact_id(reference, products)
        .or_else(|| match_name_contains(reference, products))
        .or_else(|| match_fuzzy(reference, products))
}

/// Product codes found in free text, normalised to `ABC1234` form, without
/// duplicates.
#[must_use]
pub fn extract_product_codes(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    product_code_spans(text)
        .into_iter()
        .map(|(_, code)| code)
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

/// Every product code occurrence with its byte range in `text`.
#[must_use]
pub fn product_code_spans(text: &str) -> Vec<(Range<usize>, String)> {
    PRODUCT_CODE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let code = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect::<String>()
                .to_ascii_uppercase();
            Some((whole.range(), code))
        })
        .collect()
}

fn match_exact_id(reference: &str, products: &[Product]) -> Option<ProductMatch> {
    let exact = |product: &Product| ProductMatch {
        product: product.clone(),
        kind: MatchKind::ExactId,
        score: 1.0,
    };

    let compact_reference = compact(reference);
    if let Some(product) = products
        .iter()
        .find(|p| compact(p.id.as_str()) == compact_reference)
    {
        return Some(exact(product));
    }

    for code in extract_product_codes(reference) {
        if let Some(product) = products.iter().find(|p| compact(p.id.as_str()) == code) {
            return Some(exact(product));
        }
    }

    products
        .iter()
        .find(|p| {
            let id = compact(p.id.as_str());
            id.len() >= MIN_EMBEDDED_ID_LEN && compact_reference.contains(&id)
        })
        .map(exact)
}

fn match_name_contains(reference: &str, products: &[Product]) -> Option<ProductMatch> {
    let reference = reference.to_lowercase();

    products
        .iter()
        .filter(|p| {
            let name = p.name.trim().to_lowercase();
            !name.is_empty()
                && (reference.contains(&name) || (reference.len() >= 3 && name.contains(&reference)))
        })
        .max_by_key(|p| p.name.len())
        .map(|product| ProductMatch {
            product: product.clone(),
            kind: MatchKind::NameContains,
            score: 0.9,
        })
}

fn match_fuzzy(reference: &str, products: &[Product]) -> Option<ProductMatch> {
    let reference = reference.to_lowercase();

    products
        .iter()
        .map(|p| (p, normalized_levenshtein(&reference, &p.name.to_lowercase())))
        .filter(|(_, score)| *score >= FUZZY_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(product, score)| {
            #[allow(clippy::cast_possible_truncation)]
            let score = score as f32;
            ProductMatch {
                product: product.clone(),
                kind: MatchKind::Fuzzy,
                score,
            }
        })
}

/// Shared-token ratio ranking. Products scoring zero are left out.
fn lexical_search(
    query: &str,
    limit: usize,
    products: &[Product],
    exclude: Option<&ProductId>,
) -> Vec<SearchHit> {
    let query_tokens = tokens(query);
    if query_tokens.is_empty() || limit == 0 {
        return Vec::new();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut hits: Vec<SearchHit> = products
        .iter()
        .filter(|p| exclude.is_none_or(|id| !id.matches(p.id.as_str())))
        .filter_map(|p| {
            let product_tokens = tokens(&format!("{} {}", p.id, p.search_text()));
            let shared = query_tokens.intersection(&product_tokens).count();
            (shared > 0).then(|| SearchHit {
                product: p.clone(),
                score: shared as f32 / query_tokens.len() as f32,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

fn resolve_hits(hits: Vec<super::ScoredProduct>, products: &[Product]) -> Vec<SearchHit> {
    hits.into_iter()
        .filter_map(|hit| {
            find_by_id(products, hit.product_id.as_str()).map(|product| SearchHit {
                product: product.clone(),
                score: hit.score,
            })
        })
        .collect()
}

fn find_by_id<'a>(products: &'a [Product], id: &str) -> Option<&'a Product> {
    products.iter().find(|p| p.id.matches(id))
}

fn tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Uppercase with whitespace, brackets and dashes removed.
fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '[' | ']' | '(' | ')' | '-'))
        .flat_map(char::to_uppercase)
        .collect()
}

/// `1 - distance / max_len`, in `[0, 1]`. Two empty strings score 1.
#[must_use]
pub fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let similarity = 1.0 - levenshtein(a, b) as f64 / max_len as f64;
    similarity
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut row = Vec::with_capacity(previous.len());
        row.push(i + 1);
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution =
                previous.get(j).copied().unwrap_or_default() + usize::from(ca != *cb);
            let deletion = previous.get(j + 1).copied().unwrap_or_default() + 1;
            let insertion = row.last().copied().unwrap_or_default() + 1;
            row.push(substitution.min(deletion).min(insertion));
        }
        previous = row;
    }

    previous.last().copied().unwrap_or_default()
}
