//! Multi-signal retrieval
//!
//! Provides the two first-stage signals and their fusion:
//! - Dense retrieval (embedding nearest-neighbor search)
//! - Keyword retrieval (BM25 over the tokenized corpus)
//! - Weighted linear fusion resolved to full product records

mod bm25;
mod dense;
mod fusion;
mod keyword;
mod vector;

pub use bm25::Bm25Index;
pub use dense::{DenseRetriever, DEFAULT_DENSE_LIMIT};
pub use fusion::{fuse_scores, FusedCandidate, FusionEngine, DEFAULT_ALPHA, DEFAULT_FUSION_LIMIT};
pub use keyword::{tokenize, KeywordRetriever, DEFAULT_KEYWORD_LIMIT};
pub use vector::QdrantIndex;

use async_trait::async_trait;
use shopsage_common::errors::Result;
use shopsage_common::models::ProductRecord;
use std::collections::HashMap;

/// Product id -> relevance score for one signal
pub type ScoreMap = HashMap<String, f32>;

/// One nearest-neighbor match from the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Numeric id in the vector store
    pub point_id: Option<u64>,

    /// Product id declared in the point payload
    pub product_id: Option<String>,

    /// Similarity as reported by the index
    pub score: f32,
}

/// Vector similarity index holding one point per product
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbors of `vector`, best first
    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    /// Records for the given numeric ids, in no particular order
    async fn fetch_by_ids(&self, ids: &[u64]) -> Result<Vec<ProductRecord>>;

    /// Number of points in the collection
    async fn point_count(&self) -> Result<u64>;
}

/// Keyword scoring structure built over the whole corpus
pub trait KeywordScorer: Send + Sync {
    /// One score per corpus position
    fn scores(&self, tokens: &[String]) -> Result<Vec<f32>>;

    /// Number of documents in the corpus
    fn corpus_len(&self) -> usize;
}
