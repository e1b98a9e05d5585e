//! Dense retrieval through the embedding model and vector index
//!
//! Scores are passed through in the index's own scale.

use super::{ScoreMap, VectorIndex};
use crate::cache::BoundedCache;
use shopsage_common::embeddings::Embedder;
use shopsage_common::errors::{AppError, Result, Stage};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Neighbors requested per query
pub const DEFAULT_DENSE_LIMIT: usize = 50;

/// Dense retriever owning the embedding and dense-result caches
pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    embeddings: BoundedCache<String, Arc<Vec<f32>>>,
    results: BoundedCache<(String, usize), Arc<ScoreMap>>,
}

impl DenseRetriever {
    /// Create a new dense retriever
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            embeddings: BoundedCache::new("embedding", cache_capacity),
            results: BoundedCache::new("dense", cache_capacity),
        }
    }

    /// Query vector, cached by raw query text
    #[instrument(skip(self), fields(model = self.embedder.model_name()))]
    pub async fn embed(&self, query: &str) -> Result<Arc<Vec<f32>>> {
        self.embeddings
            .get_or_compute(query.to_string(), move || async move {
                let vector = self.embedder.embed(query).await.map_err(|e| {
                    warn!(error = %e, "Embedding failed");
                    AppError::retrieval(Stage::Embedding, query, e)
                })?;
                Ok(Arc::new(vector))
            })
            .await
    }

    /// Top `limit` product ids by vector similarity, cached by (query, limit)
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Arc<ScoreMap>> {
        self.results
            .get_or_compute((query.to_string(), limit), move || async move {
                let vector = self.embed(query).await?;

                let hits = self
                    .index
                    .nearest_neighbors(&vector, limit)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "Vector search failed");
                        AppError::retrieval(Stage::Dense, query, e)
                    })?;

                let mut scores = ScoreMap::with_capacity(hits.len());
                for hit in hits {
                    let Some(product_id) = hit.product_id else {
                        debug!(point_id = ?hit.point_id, "Neighbor without product id skipped");
                        continue;
                    };
                    // Duplicate product ids keep their best score
                    match scores.entry(product_id) {
                        Entry::Occupied(mut existing) => {
                            if hit.score > *existing.get() {
                                existing.insert(hit.score);
                            }
                        }
                        Entry::Vacant(slot) => {
                            slot.insert(hit.score);
                        }
                    }
                }

                debug!(results = scores.len(), "Dense retrieval complete");
                Ok(Arc::new(scores))
            })
            .await
    }

    pub async fn embedding_cache_len(&self) -> usize {
        self.embeddings.len().await
    }

    pub async fn result_cache_len(&self) -> usize {
        self.results.len().await
    }
}
