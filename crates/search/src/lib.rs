//! ShopSage search engine
//!
//! Hybrid product retrieval:
//! - Dense retrieval over a Qdrant collection
//! - BM25 keyword retrieval over a static corpus
//! - Weighted linear fusion resolved to product records
//! - Cross-encoder reranking blended with sentiment and popularity
//! - Bounded FIFO caches in front of every stage

pub mod artifacts;
pub mod cache;
pub mod evaluation;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{CacheStats, Collaborators, SearchPipeline, SearchQuery, SearchResponse, SearchResults};
pub use rerank::{RankedResult, RelevanceModel, Reranker};
pub use retrieval::{FusedCandidate, KeywordScorer, VectorIndex};
