//! Second-stage reranking
//!
//! Scores each fused candidate with a cross-encoder relevance model and
//! blends the result with two business priors:
//!
//! `combined = w_rel * relevance + w_sent * sentiment + w_pop * min(reviews / saturation, 1)`
//!
//! Popularity stops growing at the saturation point, so review volume alone
//! is worth at most `w_pop`.

mod client;

pub use client::{create_relevance_model, HttpRelevanceModel, MockRelevanceModel};

use crate::retrieval::FusedCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shopsage_common::config::RerankWeights;
use shopsage_common::errors::{AppError, Result};
use shopsage_common::metrics;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Cross-encoder style relevance model
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    /// One relevance score per `(query, document)` pair, in input order
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}

/// Fused candidate with its final score and 1-based rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub candidate: FusedCandidate,
    pub rerank_score: f32,
    pub rank: usize,
}

/// Reranker blending model relevance with sentiment and popularity
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
    weights: RerankWeights,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, weights: RerankWeights) -> Self {
        Self { model, weights }
    }

    /// Blend one relevance score with the candidate's priors
    pub fn combined_score(&self, relevance: f32, candidate: &FusedCandidate) -> f32 {
        let record = &candidate.record;
        let saturation = self.weights.review_saturation.max(1) as f32;
        let popularity = (record.review_count as f32 / saturation).min(1.0);

        self.weights.relevance_weight * relevance
            + self.weights.sentiment_weight * record.sentiment_score
            + self.weights.popularity_weight * popularity
    }

    /// Rerank `candidates` and keep the best `limit`.
    ///
    /// An empty candidate list returns immediately without calling the
    /// model. A model failure is reported as [`AppError::RerankUnavailable`];
    /// falling back to fused order is the caller's decision.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len(), model = self.model.model_name()))]
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[FusedCandidate],
        limit: usize,
    ) -> Result<Vec<RankedResult>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|c| (query.to_string(), c.record.rerank_document()))
            .collect();

        let relevance = self.model.score(&pairs).await.map_err(|e| {
            warn!(error = %e, "Relevance model failed");
            metrics::record_rerank_failure();
            AppError::RerankUnavailable {
                query: query.to_string(),
                message: e.to_string(),
            }
        })?;

        if relevance.len() != candidates.len() {
            warn!(
                expected = candidates.len(),
                received = relevance.len(),
                "Relevance model returned wrong number of scores"
            );
            metrics::record_rerank_failure();
            return Err(AppError::RerankUnavailable {
                query: query.to_string(),
                message: format!(
                    "expected {} scores, got {}",
                    candidates.len(),
                    relevance.len()
                ),
            });
        }

        let mut scored: Vec<(f32, &FusedCandidate)> = relevance
            .iter()
            .zip(candidates)
            .map(|(&rel, candidate)| (self.combined_score(rel, candidate), candidate))
            .collect();

        // Combined score, then fused score, then product id
        scored.sort_by(|(a_score, a), (b_score, b)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| FusedCandidate::ranking_order(a, b))
        });
        scored.truncate(limit);

        let results: Vec<RankedResult> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (rerank_score, candidate))| RankedResult {
                candidate: candidate.clone(),
                rerank_score,
                rank: i + 1,
            })
            .collect();

        debug!(results = results.len(), "Rerank complete");
        Ok(results)
    }
}

impl RankedResult {
    pub fn product_id(&self) -> &str {
        &self.candidate.product_id
    }
}
