//! Search pipeline facade
//!
//! The single entry point callers use: validate, embed, retrieve both
//! signals, fuse, then either rerank or truncate. Fusion always runs with
//! the engine's own candidate limit and alpha; the caller's `top_k` only
//! applies to the final list.

use crate::artifacts::{IdMapping, KeywordIndexArtifact};
use crate::rerank::{create_relevance_model, RankedResult, RelevanceModel, Reranker};
use crate::retrieval::{
    DenseRetriever, FusedCandidate, FusionEngine, KeywordRetriever, KeywordScorer, QdrantIndex,
    VectorIndex,
};
use serde::{Deserialize, Serialize};
use shopsage_common::config::{AppConfig, EngineSettings, RerankWeights};
use shopsage_common::embeddings::{create_embedder, Embedder};
use shopsage_common::errors::{Result, Stage};
use shopsage_common::metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Largest `top_k` a caller may ask for
pub const MAX_TOP_K: usize = 10;

/// A caller's search request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(length(min = 2))]
    pub text: String,

    #[validate(range(min = 1, max = 10))]
    pub top_k: usize,

    pub use_reranker: bool,
}

/// Everything the engine calls out to
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub keyword_scorer: Arc<dyn KeywordScorer>,
    /// Product id at each keyword corpus position
    pub keyword_product_ids: Arc<Vec<String>>,
    pub id_mapping: Arc<IdMapping>,
    pub relevance_model: Arc<dyn RelevanceModel>,
}

impl Collaborators {
    /// Load both artifacts and build the configured clients.
    ///
    /// Artifact problems surface here, before any query is served.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let (bm25, product_ids) =
            KeywordIndexArtifact::load(&config.artifacts.keyword_index_path)?.into_index();
        let id_mapping = IdMapping::load(&config.artifacts.id_mapping_path)?;

        Ok(Self {
            embedder: create_embedder(&config.embedding)?,
            vector_index: Arc::new(QdrantIndex::new(&config.vector_store)?),
            keyword_scorer: Arc::new(bm25),
            keyword_product_ids: Arc::new(product_ids),
            id_mapping: Arc::new(id_mapping),
            relevance_model: create_relevance_model(&config.reranker)?,
        })
    }
}

/// Final results, reranked or straight from fusion
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Ranked(Vec<RankedResult>),
    Fused(Vec<FusedCandidate>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Ranked(results) => results.len(),
            SearchResults::Fused(results) => results.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Product ids in result order
    pub fn product_ids(&self) -> Vec<&str> {
        match self {
            SearchResults::Ranked(results) => results.iter().map(|r| r.product_id()).collect(),
            SearchResults::Fused(results) => results.iter().map(|c| c.product_id.as_str()).collect(),
        }
    }
}

/// Milliseconds spent per stage, warm caches included
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyBreakdown {
    pub embedding_ms: f64,
    pub dense_ms: f64,
    pub keyword_ms: f64,
    pub fusion_ms: f64,
    pub rerank_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: SearchResults,
    pub num_results: usize,
    /// Whether the fused candidates were already cached
    pub cached: bool,
    pub latency: LatencyBreakdown,
    pub response_time_ms: f64,
}

/// Entry counts per stage cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub embedding: usize,
    pub dense: usize,
    pub keyword: usize,
    pub fusion: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_products: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub keyword_documents: usize,
    pub id_mappings: usize,
}

/// Hybrid search engine
pub struct SearchPipeline {
    dense: Arc<DenseRetriever>,
    keyword: Arc<KeywordRetriever>,
    fusion: FusionEngine,
    reranker: Reranker,
    index: Arc<dyn VectorIndex>,
    keyword_documents: usize,
    id_mappings: usize,
    settings: EngineSettings,
}

impl SearchPipeline {
    pub fn new(collaborators: Collaborators, settings: EngineSettings, weights: RerankWeights) -> Self {
        let capacity = settings.cache_capacity;

        let dense = Arc::new(DenseRetriever::new(
            collaborators.embedder,
            collaborators.vector_index.clone(),
            capacity,
        ));
        let keyword_documents = collaborators.keyword_product_ids.len();
        let keyword = Arc::new(KeywordRetriever::new(
            collaborators.keyword_scorer,
            collaborators.keyword_product_ids,
            capacity,
        ));
        let id_mappings = collaborators.id_mapping.len();
        let fusion = FusionEngine::new(
            dense.clone(),
            keyword.clone(),
            collaborators.vector_index.clone(),
            collaborators.id_mapping,
            capacity,
        )
        .with_candidate_limits(settings.dense_limit, settings.keyword_limit);

        Self {
            dense,
            keyword,
            fusion,
            reranker: Reranker::new(collaborators.relevance_model, weights),
            index: collaborators.vector_index,
            keyword_documents,
            id_mappings,
            settings,
        }
    }

    /// Run one query end to end.
    ///
    /// Queries shorter than two characters are rejected before any
    /// collaborator is called. A reranker failure is returned as is; serving
    /// fused results instead is up to the caller.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, top_k: usize, use_reranker: bool) -> Result<SearchResponse> {
        let start = Instant::now();

        SearchQuery {
            text: query.to_string(),
            top_k,
            use_reranker,
        }
        .validate()?;

        let fusion_limit = self.settings.fusion_limit;
        let alpha = self.settings.alpha;
        let cached = self.fusion.is_cached(query, fusion_limit, alpha).await;
        let mut latency = LatencyBreakdown::default();

        let (_, embedding_ms) = timed(Stage::Embedding, self.dense.embed(query)).await?;
        latency.embedding_ms = embedding_ms;

        let ((_, dense_ms), (_, keyword_ms)) = tokio::try_join!(
            timed(Stage::Dense, self.dense.search(query, self.settings.dense_limit)),
            timed(Stage::Keyword, self.keyword.search(query, self.settings.keyword_limit)),
        )?;
        latency.dense_ms = dense_ms;
        latency.keyword_ms = keyword_ms;

        let (candidates, fusion_ms) =
            timed(Stage::Fusion, self.fusion.fuse(query, fusion_limit, alpha)).await?;
        latency.fusion_ms = fusion_ms;

        let results = if use_reranker {
            let (ranked, rerank_ms) =
                timed(Stage::Rerank, self.reranker.rerank(query, &candidates, top_k)).await?;
            latency.rerank_ms = rerank_ms;
            SearchResults::Ranked(ranked)
        } else {
            SearchResults::Fused(candidates.iter().take(top_k).cloned().collect())
        };

        let elapsed = start.elapsed();
        let num_results = results.len();
        metrics::record_search(elapsed.as_secs_f64(), use_reranker, num_results);

        info!(
            query = %query,
            results = num_results,
            cached = cached,
            reranked = use_reranker,
            latency_ms = elapsed.as_millis() as u64,
            "Search completed"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            num_results,
            cached,
            latency,
            response_time_ms: round_ms(elapsed.as_secs_f64() * 1000.0),
        })
    }

    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            embedding: self.dense.embedding_cache_len().await,
            dense: self.dense.result_cache_len().await,
            keyword: self.keyword.cache_len().await,
            fusion: self.fusion.cache_len().await,
        }
    }

    /// Probe the vector index and report the loaded artifact sizes
    pub async fn health(&self) -> HealthReport {
        let (status, indexed_products, error) = match self.index.point_count().await {
            Ok(count) => ("healthy", Some(count), None),
            Err(e) => {
                warn!(error = %e, "Vector index health check failed");
                ("degraded", None, Some(e.to_string()))
            }
        };

        HealthReport {
            status,
            version: shopsage_common::VERSION,
            indexed_products,
            error,
            keyword_documents: self.keyword_documents,
            id_mappings: self.id_mappings,
        }
    }
}

/// Await a stage, recording its duration; returns milliseconds
async fn timed<T>(stage: Stage, stage_future: impl Future<Output = Result<T>>) -> Result<(T, f64)> {
    let start = Instant::now();
    let value = stage_future.await?;
    let secs = start.elapsed().as_secs_f64();
    metrics::record_stage(stage, secs);
    Ok((value, round_ms(secs * 1000.0)))
}

fn round_ms(ms: f64) -> f64 {
    (ms * 10.0).round() / 10.0
}
