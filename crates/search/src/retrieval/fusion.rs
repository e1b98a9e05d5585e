//! Weighted linear fusion of dense and keyword signals
//!
//! `fused = alpha * dense + (1 - alpha) * keyword`, a missing signal
//! counting as zero. Unlike rank-based fusion this keeps the score
//! magnitudes, so alpha trades the two signals off continuously.
//!
//! Ordering is fused score descending, then product id ascending, so equal
//! scores come out the same way on every run.

use super::{DenseRetriever, KeywordRetriever, ScoreMap, VectorIndex};
use crate::artifacts::IdMapping;
use crate::cache::BoundedCache;
use serde::{Deserialize, Serialize};
use shopsage_common::errors::{AppError, Result, Stage};
use shopsage_common::metrics;
use shopsage_common::models::ProductRecord;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Candidates kept after fusion
pub const DEFAULT_FUSION_LIMIT: usize = 20;

/// Dense weight; keyword gets the remainder
pub const DEFAULT_ALPHA: f32 = 0.65;

/// Fused candidate resolved to its product record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub product_id: String,
    pub fused_score: f32,
    pub record: ProductRecord,
}

impl FusedCandidate {
    /// Fused score descending, product id ascending
    pub fn ranking_order(a: &Self, b: &Self) -> Ordering {
        by_score_then_id(a.fused_score, &a.product_id, b.fused_score, &b.product_id)
    }
}

fn by_score_then_id(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(b_id))
}

/// Combine two score maps and keep the best `limit` ids
pub fn fuse_scores(dense: &ScoreMap, keyword: &ScoreMap, alpha: f32, limit: usize) -> Vec<(String, f32)> {
    let ids: HashSet<&String> = dense.keys().chain(keyword.keys()).collect();

    let mut fused: Vec<(String, f32)> = ids
        .into_iter()
        .map(|id| {
            let d = dense.get(id).copied().unwrap_or(0.0);
            let k = keyword.get(id).copied().unwrap_or(0.0);
            (id.clone(), alpha * d + (1.0 - alpha) * k)
        })
        .collect();

    fused.sort_by(|a, b| by_score_then_id(a.1, &a.0, b.1, &b.0));
    fused.truncate(limit);
    fused
}

/// Fusion cache key; alpha is keyed by its bit pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FusionKey {
    query: String,
    limit: usize,
    alpha_bits: u32,
}

impl FusionKey {
    pub fn new(query: &str, limit: usize, alpha: f32) -> Self {
        Self {
            query: query.to_string(),
            limit,
            alpha_bits: alpha.to_bits(),
        }
    }
}

/// Fusion stage owning the fused-result cache
pub struct FusionEngine {
    dense: Arc<DenseRetriever>,
    keyword: Arc<KeywordRetriever>,
    records: Arc<dyn VectorIndex>,
    id_mapping: Arc<IdMapping>,
    cache: BoundedCache<FusionKey, Arc<Vec<FusedCandidate>>>,
    dense_limit: usize,
    keyword_limit: usize,
}

impl FusionEngine {
    pub fn new(
        dense: Arc<DenseRetriever>,
        keyword: Arc<KeywordRetriever>,
        records: Arc<dyn VectorIndex>,
        id_mapping: Arc<IdMapping>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            dense,
            keyword,
            records,
            id_mapping,
            cache: BoundedCache::new("fusion", cache_capacity),
            dense_limit: super::DEFAULT_DENSE_LIMIT,
            keyword_limit: super::DEFAULT_KEYWORD_LIMIT,
        }
    }

    /// Override how many candidates each signal contributes
    pub fn with_candidate_limits(mut self, dense_limit: usize, keyword_limit: usize) -> Self {
        self.dense_limit = dense_limit;
        self.keyword_limit = keyword_limit;
        self
    }

    /// At most `limit` candidates, fused score non-increasing.
    ///
    /// Ids with no mapping entry or no returned record are dropped, so the
    /// result may be shorter than `limit`.
    #[instrument(skip(self))]
    pub async fn fuse(&self, query: &str, limit: usize, alpha: f32) -> Result<Arc<Vec<FusedCandidate>>> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(AppError::Validation {
                message: format!("alpha must be within [0, 1], got {}", alpha),
                field: Some("alpha".to_string()),
            });
        }

        self.cache
            .get_or_compute(FusionKey::new(query, limit, alpha), move || async move {
                // Keyword scoring needs only the text, so it runs alongside dense
                let (dense, keyword) = tokio::try_join!(
                    self.dense.search(query, self.dense_limit),
                    self.keyword.search(query, self.keyword_limit),
                )?;

                let ranked = fuse_scores(&dense, &keyword, alpha, limit);
                let candidates = self.resolve(query, ranked).await?;

                debug!(results = candidates.len(), "Fusion complete");
                Ok(Arc::new(candidates))
            })
            .await
    }

    /// Whether `fuse` would be served from cache
    pub async fn is_cached(&self, query: &str, limit: usize, alpha: f32) -> bool {
        self.cache.contains(&FusionKey::new(query, limit, alpha)).await
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    async fn resolve(&self, query: &str, ranked: Vec<(String, f32)>) -> Result<Vec<FusedCandidate>> {
        let mut numeric_ids = Vec::with_capacity(ranked.len());
        let mut gaps = 0usize;
        for (product_id, _) in &ranked {
            match self.id_mapping.get(product_id) {
                Some(id) => numeric_ids.push(id),
                None => {
                    debug!(product_id = %product_id, "No id mapping, candidate dropped");
                    gaps += 1;
                }
            }
        }

        let fused_scores: HashMap<String, f32> = ranked.into_iter().collect();

        let records = if numeric_ids.is_empty() {
            Vec::new()
        } else {
            self.records.fetch_by_ids(&numeric_ids).await.map_err(|e| {
                warn!(error = %e, "Record fetch failed");
                AppError::retrieval(Stage::Records, query, e)
            })?
        };

        // Bulk fetch order is not guaranteed: rebuild from the score map
        let mut seen = HashSet::with_capacity(records.len());
        let mut candidates: Vec<FusedCandidate> = records
            .into_iter()
            .filter_map(|record| {
                let fused_score = *fused_scores.get(&record.product_id)?;
                if !seen.insert(record.product_id.clone()) {
                    return None;
                }
                Some(FusedCandidate {
                    product_id: record.product_id.clone(),
                    fused_score,
                    record,
                })
            })
            .collect();

        gaps += numeric_ids.len().saturating_sub(candidates.len());
        if gaps > 0 {
            debug!(dropped = gaps, "Fused candidates without records dropped");
            metrics::record_mapping_gaps(gaps);
        }

        candidates.sort_by(FusedCandidate::ranking_order);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{product, CountingEmbedder, FakeVectorIndex, FixedKeywordScorer};

    fn map(entries: &[(&str, f32)]) -> ScoreMap {
        entries.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_worked_example_ranks_a_c_b() {
        let dense = map(&[("A", 0.9), ("B", 0.4)]);
        let keyword = map(&[("A", 0.2), ("C", 0.8)]);

        let fused = fuse_scores(&dense, &keyword, 0.65, 20);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);
        assert!(approx(fused[0].1, 0.655));
        assert!(approx(fused[1].1, 0.28));
        assert!(approx(fused[2].1, 0.26));
    }

    #[test]
    fn test_alpha_crossing_flips_order() {
        // X is dense-only, Y is keyword-only: they swap at alpha = 0.5
        let dense = map(&[("X", 0.8)]);
        let keyword = map(&[("Y", 0.8)]);

        let high = fuse_scores(&dense, &keyword, 0.7, 2);
        assert_eq!(high[0].0, "X");

        let low = fuse_scores(&dense, &keyword, 0.3, 2);
        assert_eq!(low[0].0, "Y");
    }

    #[test]
    fn test_dense_contribution_grows_with_alpha() {
        let dense = map(&[("A", 0.6)]);
        let keyword = map(&[("A", 0.2)]);

        let mut previous = f32::MIN;
        for step in 0..=10 {
            let alpha = step as f32 / 10.0;
            let score = fuse_scores(&dense, &keyword, alpha, 1)[0].1;
            assert!(score > previous);
            previous = score;
        }
    }

    #[test]
    fn test_ties_broken_by_product_id() {
        let dense = map(&[("b", 0.5), ("a", 0.5), ("c", 0.5)]);
        let fused = fuse_scores(&dense, &ScoreMap::new(), 1.0, 10);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_truncates_to_limit_sorted_non_increasing() {
        let dense: ScoreMap = (0..30).map(|i| (format!("D{:02}", i), i as f32 / 30.0)).collect();
        let keyword: ScoreMap = (0..30).map(|i| (format!("K{:02}", i), i as f32 / 30.0)).collect();

        let fused = fuse_scores(&dense, &keyword, 0.65, 20);
        assert_eq!(fused.len(), 20);
        assert!(fused.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    struct Fixture {
        engine: FusionEngine,
        index: Arc<FakeVectorIndex>,
        embedder: Arc<CountingEmbedder>,
    }

    /// Dense {A:0.9, B:0.4}; keyword {A:0.25, C:1.0} after normalization
    fn fixture(mapped: &[&str]) -> Fixture {
        let index = Arc::new(
            FakeVectorIndex::with_hits(&[("A", 0.9), ("B", 0.4)])
                .with_records(vec![product("A", 10, 0.5), product("B", 10, 0.5), product("C", 10, 0.5)]),
        );
        let embedder = Arc::new(CountingEmbedder::new());
        let dense = Arc::new(DenseRetriever::new(embedder.clone(), index.clone(), 10));

        let scorer = Arc::new(FixedKeywordScorer::new(vec![0.5, 2.0]));
        let keyword = Arc::new(KeywordRetriever::new(
            scorer,
            Arc::new(vec!["A".to_string(), "C".to_string()]),
            10,
        ));

        let mapping = IdMapping::from_pairs(
            mapped
                .iter()
                .map(|id| (id.to_string(), FakeVectorIndex::point_id_of(id))),
        );

        let engine = FusionEngine::new(dense, keyword, index.clone(), Arc::new(mapping), 10);
        Fixture { engine, index, embedder }
    }

    #[tokio::test]
    async fn test_fuse_resolves_records_in_score_order() {
        let fx = fixture(&["A", "B", "C"]);
        let results = fx.engine.fuse("earbuds", 20, 0.65).await.unwrap();

        let order: Vec<&str> = results.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);
        assert!(approx(results[0].fused_score, 0.65 * 0.9 + 0.35 * 0.25));
        assert!(approx(results[1].fused_score, 0.35));
        assert!(approx(results[2].fused_score, 0.26));
        assert_eq!(results[0].record.product_id, "A");
    }

    #[tokio::test]
    async fn test_reversed_record_order_is_resorted() {
        let fx = fixture(&["A", "B", "C"]);
        fx.index.reverse_fetch_order();

        let results = fx.engine.fuse("earbuds", 20, 0.65).await.unwrap();
        let order: Vec<&str> = results.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);
    }

    #[tokio::test]
    async fn test_unmapped_ids_silently_dropped() {
        let fx = fixture(&["A", "B"]);
        let results = fx.engine.fuse("earbuds", 20, 0.65).await.unwrap();

        let order: Vec<&str> = results.iter().map(|c| c.product_id.as_str()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_limit_applies_before_resolution() {
        let fx = fixture(&["A", "B", "C"]);
        let results = fx.engine.fuse("earbuds", 2, 0.65).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(fx.index.last_fetch_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_fusion_cached_by_query_limit_alpha() {
        let fx = fixture(&["A", "B", "C"]);
        assert!(!fx.engine.is_cached("earbuds", 20, 0.65).await);

        fx.engine.fuse("earbuds", 20, 0.65).await.unwrap();
        fx.engine.fuse("earbuds", 20, 0.65).await.unwrap();
        assert!(fx.engine.is_cached("earbuds", 20, 0.65).await);
        assert_eq!(fx.index.fetch_calls(), 1);

        // New alpha: new fusion entry, upstream signals reused
        fx.engine.fuse("earbuds", 20, 0.5).await.unwrap();
        assert_eq!(fx.index.fetch_calls(), 2);
        assert_eq!(fx.index.search_calls(), 1);
        assert_eq!(fx.embedder.calls(), 1);
        assert_eq!(fx.engine.cache_len().await, 2);
    }

    #[tokio::test]
    async fn test_alpha_out_of_range_rejected() {
        let fx = fixture(&["A"]);
        let err = fx.engine.fuse("earbuds", 20, 1.2).await.unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(fx.embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_record_store_failure_not_cached() {
        let fx = fixture(&["A", "B", "C"]);
        fx.index.fail_fetches();

        let err = fx.engine.fuse("earbuds", 20, 0.65).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Records));
        assert_eq!(fx.engine.cache_len().await, 0);
    }
}
