//! Vector index client for Qdrant's REST API
//!
//! Each point carries a product payload; the payload's `product_id`
//! is the id the rest of the engine works with.

use super::{VectorHit, VectorIndex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopsage_common::config::VectorStoreConfig;
use shopsage_common::errors::{AppError, Result};
use shopsage_common::models::ProductRecord;
use std::time::Duration;
use tracing::warn;

/// Qdrant collection client
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    ids: &'a [u64],
    with_payload: bool,
    with_vector: bool,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct RetrievedPoint {
    id: Value,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
}

impl QdrantIndex {
    /// Create a new client for one collection
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| AppError::VectorStoreError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::VectorStoreError {
                message: format!("Collection '{}' returned {}: {}", self.collection, status, body),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| AppError::VectorStoreError {
            message: format!("Failed to parse response: {}", e),
        })?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let request = QueryRequest {
            query: vector,
            limit,
            with_payload: true,
        };

        let result: QueryResult = self
            .send(self.client.post(self.url("/points/query")).json(&request))
            .await?;

        Ok(result
            .points
            .into_iter()
            .map(|point| VectorHit {
                point_id: point.id.as_u64(),
                product_id: point
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("product_id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                score: point.score,
            })
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[u64]) -> Result<Vec<ProductRecord>> {
        let request = RetrieveRequest {
            ids,
            with_payload: true,
            with_vector: false,
        };

        let points: Vec<RetrievedPoint> = self
            .send(self.client.post(self.url("/points")).json(&request))
            .await?;

        // A malformed payload loses one product, not the whole request
        Ok(points
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                match serde_json::from_value::<ProductRecord>(payload) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(point_id = %point.id, error = %e, "Malformed product payload skipped");
                        None
                    }
                }
            })
            .collect())
    }

    async fn point_count(&self) -> Result<u64> {
        let info: CollectionInfo = self.send(self.client.get(self.url(""))).await?;
        Ok(info.points_count.unwrap_or(0))
    }
}
