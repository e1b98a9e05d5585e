//! Relevance model clients
//!
//! - text-embeddings-inference style `/rerank` endpoint over HTTP
//! - Token-overlap mock for tests and offline runs

use super::RelevanceModel;
use crate::retrieval::tokenize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shopsage_common::config::RerankerConfig;
use shopsage_common::errors::{AppError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cross-encoder served behind `POST /rerank`
pub struct HttpRelevanceModel {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: Vec<&'a str>,
    /// Cut inputs past the model's max length instead of rejecting them
    truncate: bool,
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

impl HttpRelevanceModel {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/rerank", config.url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    async fn rerank_one_query(&self, query: &str, texts: Vec<&str>) -> Result<Vec<RerankHit>> {
        let request = RerankRequest {
            query,
            texts,
            truncate: true,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal {
                message: format!("Rerank endpoint returned {}: {}", status, body),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RelevanceModel for HttpRelevanceModel {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        // The endpoint takes one query per call; group pair positions by query
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (position, (query, _)) in pairs.iter().enumerate() {
            match groups.iter_mut().find(|(q, _)| *q == query.as_str()) {
                Some((_, positions)) => positions.push(position),
                None => groups.push((query.as_str(), vec![position])),
            }
        }

        let mut scores: Vec<Option<f32>> = vec![None; pairs.len()];
        for (query, positions) in groups {
            let texts = positions.iter().map(|&p| pairs[p].1.as_str()).collect();
            let hits = self.rerank_one_query(query, texts).await?;
            debug!(query = query, hits = hits.len(), "Rerank batch scored");

            for hit in hits {
                let Some(&position) = positions.get(hit.index) else {
                    return Err(AppError::Internal {
                        message: format!("Rerank endpoint returned unknown index {}", hit.index),
                    });
                };
                scores[position] = Some(hit.score);
            }
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(position, score)| {
                score.ok_or_else(|| AppError::Internal {
                    message: format!("Rerank endpoint returned no score for document {}", position),
                })
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Scores a pair by the share of query tokens found in the document
pub struct MockRelevanceModel;

#[async_trait]
impl RelevanceModel for MockRelevanceModel {
    async fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(query, document)| {
                let query_terms = tokenize(query);
                if query_terms.is_empty() {
                    return 0.0;
                }
                let doc_terms: HashSet<String> = tokenize(document).into_iter().collect();
                let matches = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
                matches as f32 / query_terms.len() as f32
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-overlap"
    }
}

/// Create a relevance model based on configuration
pub fn create_relevance_model(config: &RerankerConfig) -> Result<Arc<dyn RelevanceModel>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpRelevanceModel::new(config)?)),
        "mock" => Ok(Arc::new(MockRelevanceModel)),
        other => Err(AppError::Configuration {
            message: format!("Unknown reranker provider '{}'", other),
        }),
    }
}
