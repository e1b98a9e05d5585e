//! Offline retrieval quality metrics
//!
//! Binary relevance: a product is relevant if it appears in the query's
//! ground truth. Predictions are product ids in ranked order.

use crate::pipeline::SearchPipeline;
use serde::{Deserialize, Serialize};
use shopsage_common::errors::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Results requested per labelled query
pub const EVALUATION_TOP_K: usize = 10;

/// Fraction of relevant products found in the top `k`
pub fn recall_at_k(ground_truth: &HashSet<&str>, predictions: &[&str], k: usize) -> f64 {
    if ground_truth.is_empty() {
        return 0.0;
    }
    hits(ground_truth, predictions, k) as f64 / ground_truth.len() as f64
}

/// Fraction of the top `k` slots holding a relevant product
pub fn precision_at_k(ground_truth: &HashSet<&str>, predictions: &[&str], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits(ground_truth, predictions, k) as f64 / k as f64
}

/// 1 / rank of the first relevant product, 0 when none is found
pub fn reciprocal_rank(ground_truth: &HashSet<&str>, predictions: &[&str]) -> f64 {
    predictions
        .iter()
        .position(|p| ground_truth.contains(p))
        .map(|i| 1.0 / (i + 1) as f64)
        .unwrap_or(0.0)
}

pub fn ndcg_at_k(ground_truth: &HashSet<&str>, predictions: &[&str], k: usize) -> f64 {
    let dcg: f64 = predictions
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, p)| ground_truth.contains(*p))
        .map(|(i, _)| discount(i))
        .sum();

    let ideal: f64 = (0..ground_truth.len().min(k)).map(discount).sum();
    if ideal > 0.0 {
        dcg / ideal
    } else {
        0.0
    }
}

fn hits(ground_truth: &HashSet<&str>, predictions: &[&str], k: usize) -> usize {
    predictions.iter().take(k).filter(|p| ground_truth.contains(*p)).count()
}

fn discount(position: usize) -> f64 {
    1.0 / ((position + 2) as f64).log2()
}

/// A query with its known-relevant products
#[derive(Debug, Clone, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    #[serde(default)]
    pub ground_truth: Vec<String>,
}

impl LabeledQuery {
    /// Read a JSON array of labelled queries
    pub fn load_all(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricScores {
    #[serde(rename = "Recall@5")]
    pub recall_at_5: f64,
    #[serde(rename = "Recall@10")]
    pub recall_at_10: f64,
    #[serde(rename = "Precision@5")]
    pub precision_at_5: f64,
    #[serde(rename = "MRR")]
    pub mrr: f64,
    #[serde(rename = "NDCG@10")]
    pub ndcg_at_10: f64,
}

impl MetricScores {
    pub fn score(ground_truth: &[String], predictions: &[&str]) -> Self {
        let relevant: HashSet<&str> = ground_truth.iter().map(String::as_str).collect();
        Self {
            recall_at_5: recall_at_k(&relevant, predictions, 5),
            recall_at_10: recall_at_k(&relevant, predictions, 10),
            precision_at_5: precision_at_k(&relevant, predictions, 5),
            mrr: reciprocal_rank(&relevant, predictions),
            ndcg_at_10: ndcg_at_k(&relevant, predictions, 10),
        }
    }

    fn mean(scores: &[&MetricScores]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let n = scores.len() as f64;
        let avg = |f: fn(&MetricScores) -> f64| scores.iter().map(|s| f(s)).sum::<f64>() / n;
        Self {
            recall_at_5: avg(|s| s.recall_at_5),
            recall_at_10: avg(|s| s.recall_at_10),
            precision_at_5: avg(|s| s.precision_at_5),
            mrr: avg(|s| s.mrr),
            ndcg_at_10: avg(|s| s.ndcg_at_10),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryEvaluation {
    pub query: String,
    pub metrics: MetricScores,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub queries_evaluated: usize,
    /// Queries without ground truth
    pub queries_skipped: usize,
    pub average_metrics: MetricScores,
    pub per_query: Vec<QueryEvaluation>,
}

impl EvaluationReport {
    pub fn from_queries(per_query: Vec<QueryEvaluation>, queries_skipped: usize) -> Self {
        let scores: Vec<&MetricScores> = per_query.iter().map(|q| &q.metrics).collect();
        Self {
            queries_evaluated: per_query.len(),
            queries_skipped,
            average_metrics: MetricScores::mean(&scores),
            per_query,
        }
    }
}

/// Run every labelled query through the pipeline and score the results
pub async fn evaluate(
    pipeline: &SearchPipeline,
    queries: &[LabeledQuery],
    use_reranker: bool,
) -> Result<EvaluationReport> {
    let mut per_query = Vec::with_capacity(queries.len());
    let mut skipped = 0;

    for labeled in queries {
        if labeled.ground_truth.is_empty() {
            warn!(query = %labeled.query, "No ground truth, query skipped");
            skipped += 1;
            continue;
        }

        let response = pipeline
            .search(&labeled.query, EVALUATION_TOP_K, use_reranker)
            .await?;
        let metrics = MetricScores::score(&labeled.ground_truth, &response.results.product_ids());

        info!(
            query = %labeled.query,
            mrr = metrics.mrr,
            ndcg = metrics.ndcg_at_10,
            "Query evaluated"
        );
        per_query.push(QueryEvaluation {
            query: labeled.query.clone(),
            metrics,
        });
    }

    Ok(EvaluationReport::from_queries(per_query, skipped))
}
