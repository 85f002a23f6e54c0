//! Product retrieval: embeddings, the vector store, and the product matcher.

mod embeddings;
mod matcher;
mod store;

pub use embeddings::EmbeddingClient;
pub use matcher::{
    FUZZY_THRESHOLD, MatchKind, ProductMatch, ProductMatcher, SEMANTIC_THRESHOLD, SearchHit,
    SearchResults,
    extract_product_codes, match_lexical, normalized_levenshtein, product_code_spans,
};
pub use store::{ScoredProduct, VectorEntry, VectorStore, cosine_similarity};

use thiserror::Error;

use crate::openai::OpenAiError;

/// Errors from embedding and vector store operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The embeddings API call failed.
    #[error(transparent)]
    Api(#[from] OpenAiError),

    /// The embeddings API returned something unusable.
    #[error("invalid embeddings response: {0}")]
    InvalidResponse(String),

    /// A vector did not have the expected length.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// Reading or writing the vector store file failed.
    #[error("vector store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The vector store file is not valid JSON.
    #[error("vector store format error: {0}")]
    Format(#[from] serde_json::Error),

    /// No vector store or embedding client is available.
    #[error("semantic search is not available")]
    Unavailable,
}
