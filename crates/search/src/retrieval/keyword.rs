//! Keyword retrieval over the static keyword index
//!
//! Tokenization is lower-casing plus whitespace splitting, nothing else.
//! Scores are normalized by the best of the kept documents so the top
//! document lands on exactly 1.0 (or 0.0 when nothing matched).

use super::{KeywordScorer, ScoreMap};
use crate::cache::BoundedCache;
use shopsage_common::errors::{AppError, Result, Stage};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Documents kept per query
pub const DEFAULT_KEYWORD_LIMIT: usize = 50;

/// Lower-case and split on whitespace
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Keyword retriever owning the keyword-result cache
pub struct KeywordRetriever {
    scorer: Arc<dyn KeywordScorer>,
    product_ids: Arc<Vec<String>>,
    results: BoundedCache<(String, usize), Arc<ScoreMap>>,
}

impl KeywordRetriever {
    /// `product_ids[i]` names the document at corpus position `i`
    pub fn new(
        scorer: Arc<dyn KeywordScorer>,
        product_ids: Arc<Vec<String>>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            scorer,
            product_ids,
            results: BoundedCache::new("keyword", cache_capacity),
        }
    }

    /// Top `limit` product ids by normalized keyword score, cached by (query, limit)
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Arc<ScoreMap>> {
        self.results
            .get_or_compute((query.to_string(), limit), move || async move {
                let tokens = tokenize(query);
                if tokens.is_empty() || limit == 0 {
                    return Ok(Arc::new(ScoreMap::new()));
                }

                // Scoring walks the whole corpus: keep it off the async workers
                let scorer = self.scorer.clone();
                let raw = tokio::task::spawn_blocking(move || scorer.scores(&tokens))
                    .await
                    .map_err(|e| AppError::retrieval(Stage::Keyword, query, e))?
                    .map_err(|e| {
                        warn!(error = %e, "Keyword scoring failed");
                        AppError::retrieval(Stage::Keyword, query, e)
                    })?;

                if raw.len() != self.product_ids.len() {
                    return Err(AppError::retrieval(
                        Stage::Keyword,
                        query,
                        format!(
                            "scorer returned {} scores for {} indexed products",
                            raw.len(),
                            self.product_ids.len()
                        ),
                    ));
                }

                let scores = normalize_top(&raw, &self.product_ids, limit);
                debug!(results = scores.len(), "Keyword retrieval complete");
                Ok(Arc::new(scores))
            })
            .await
    }

    pub async fn cache_len(&self) -> usize {
        self.results.len().await
    }
}

/// Keep the `limit` best products and divide by the best kept score.
///
/// Ties go to the lower corpus position. A product listed at several
/// positions keeps its best score. A best score of zero (or below) divides
/// by 1.0, leaving every kept score at zero.
fn normalize_top(raw: &[f32], product_ids: &[String], limit: usize) -> ScoreMap {
    let mut positions: Vec<usize> = (0..raw.len()).collect();
    positions.sort_by(|&a, &b| raw[b].total_cmp(&raw[a]).then(a.cmp(&b)));

    let mut seen = HashSet::new();
    positions.retain(|&i| seen.insert(product_ids[i].as_str()));
    positions.truncate(limit);

    let max_score = positions.first().map(|&i| raw[i]).unwrap_or(1.0);
    let divisor = if max_score > 0.0 { max_score } else { 1.0 };

    positions
        .into_iter()
        .map(|i| (product_ids[i].clone(), (raw[i] / divisor).clamp(0.0, 1.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedKeywordScorer;

    fn ids(n: usize) -> Arc<Vec<String>> {
        Arc::new((0..n).map(|i| format!("P{}", i)).collect())
    }

    fn retriever(scores: Vec<f32>) -> (KeywordRetriever, Arc<FixedKeywordScorer>) {
        let n = scores.len();
        let scorer = Arc::new(FixedKeywordScorer::new(scores));
        (KeywordRetriever::new(scorer.clone(), ids(n), 10), scorer)
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_on_whitespace() {
        assert_eq!(
            tokenize("  Noise-Cancelling\tHEADPHONES  for kids "),
            vec!["noise-cancelling", "headphones", "for", "kids"]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[tokio::test]
    async fn test_top_score_normalized_to_one() {
        let (keyword, _) = retriever(vec![2.0, 8.0, 4.0, 0.0]);
        let scores = keyword.search("usb cable", 3).await.unwrap();

        assert_eq!(scores.len(), 3);
        assert_eq!(scores["P1"], 1.0);
        assert_eq!(scores["P2"], 0.5);
        assert_eq!(scores["P0"], 0.25);
        assert!(!scores.contains_key("P3"));
        assert!(scores.values().all(|s| (0.0..=1.0).contains(s)));
    }

    #[tokio::test]
    async fn test_repeated_product_keeps_best_score() {
        let scorer = Arc::new(FixedKeywordScorer::new(vec![8.0, 4.0, 2.0, 1.0]));
        let product_ids = Arc::new(vec![
            "P".to_string(),
            "Q".to_string(),
            "P".to_string(),
            "R".to_string(),
        ]);
        let keyword = KeywordRetriever::new(scorer, product_ids, 10);

        let scores = keyword.search("usb cable", 3).await.unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(scores["P"], 1.0);
        assert_eq!(scores["Q"], 0.5);
        assert_eq!(scores["R"], 0.125);
    }

    #[tokio::test]
    async fn test_all_zero_scores_stay_zero() {
        let (keyword, _) = retriever(vec![0.0, 0.0, 0.0]);
        let scores = keyword.search("zzz", 2).await.unwrap();

        assert_eq!(scores.len(), 2);
        assert!(scores.values().all(|&s| s == 0.0));
        // Ties resolved by corpus position
        assert!(scores.contains_key("P0"));
        assert!(scores.contains_key("P1"));
    }

    #[tokio::test]
    async fn test_empty_query_yields_empty_map_without_scoring() {
        let (keyword, scorer) = retriever(vec![1.0, 2.0]);
        let scores = keyword.search("   \t ", 50).await.unwrap();

        assert!(scores.is_empty());
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_scorer_receives_lowercased_tokens_and_is_cached() {
        let (keyword, scorer) = retriever(vec![1.0, 2.0]);
        keyword.search("Desk LAMP", 50).await.unwrap();
        keyword.search("Desk LAMP", 50).await.unwrap();

        assert_eq!(scorer.calls(), 1);
        assert_eq!(scorer.last_tokens(), vec!["desk", "lamp"]);
        assert_eq!(keyword.cache_len().await, 1);
    }

    #[tokio::test]
    async fn test_misaligned_index_is_retrieval_unavailable() {
        let scorer = Arc::new(FixedKeywordScorer::new(vec![1.0, 2.0, 3.0]));
        let keyword = KeywordRetriever::new(scorer, ids(2), 10);

        let err = keyword.search("lamp", 50).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Keyword));
        assert_eq!(keyword.cache_len().await, 0);
    }

    #[tokio::test]
    async fn test_scorer_failure_propagates() {
        let scorer = Arc::new(FixedKeywordScorer::failing());
        let keyword = KeywordRetriever::new(scorer, ids(2), 10);

        let err = keyword.search("lamp", 50).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::RetrievalUnavailable { stage: Stage::Keyword, .. }
        ));
    }
}
