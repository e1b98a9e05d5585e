//! Configuration management for ShopSage
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Retrieval and fusion parameters
    #[serde(default)]
    pub engine: EngineSettings,

    /// Reranker blend weights
    #[serde(default)]
    pub rerank: RerankWeights,

    /// Static lookup artifacts loaded at startup
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Vector index collaborator
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Embedding collaborator
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Relevance model collaborator
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Retrieval, fusion and cache parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Entries held by each of the four stage caches
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Neighbors requested from the vector index
    #[serde(default = "default_candidate_limit")]
    pub dense_limit: usize,

    /// Documents kept from keyword scoring
    #[serde(default = "default_candidate_limit")]
    pub keyword_limit: usize,

    /// Candidates kept after fusion
    #[serde(default = "default_fusion_limit")]
    pub fusion_limit: usize,

    /// Dense weight; keyword gets 1 - alpha
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

/// Weights blending relevance with business priors
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankWeights {
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f32,

    #[serde(default = "default_sentiment_weight")]
    pub sentiment_weight: f32,

    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f32,

    /// Review count at which popularity stops growing
    #[serde(default = "default_review_saturation")]
    pub review_saturation: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactConfig {
    /// Keyword index bundle (corpus tokens + product ids)
    #[serde(default = "default_keyword_index_path")]
    pub keyword_index_path: String,

    /// Product id -> vector store numeric id
    #[serde(default = "default_id_mapping_path")]
    pub id_mapping_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorStoreConfig {
    /// Qdrant base URL
    #[serde(default = "default_vector_store_url")]
    pub url: String,

    /// API key (optional for local deployments)
    pub api_key: Option<String>,

    /// Collection holding product points
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries inside the client
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankerConfig {
    /// Relevance model provider: http, mock
    #[serde(default = "default_reranker_provider")]
    pub provider: String,

    /// Rerank endpoint base URL
    #[serde(default = "default_reranker_url")]
    pub url: String,

    /// Cross-encoder model name
    #[serde(default = "default_reranker_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_cache_capacity() -> usize { 1000 }
fn default_candidate_limit() -> usize { 50 }
fn default_fusion_limit() -> usize { 20 }
fn default_alpha() -> f32 { 0.65 }
fn default_relevance_weight() -> f32 { 0.70 }
fn default_sentiment_weight() -> f32 { 0.20 }
fn default_popularity_weight() -> f32 { 0.10 }
fn default_review_saturation() -> u32 { 500 }
fn default_keyword_index_path() -> String { "cache/keyword_index.json".to_string() }
fn default_id_mapping_path() -> String { "cache/product_id_mapping.json".to_string() }
fn default_vector_store_url() -> String { "http://localhost:6333".to_string() }
fn default_collection() -> String { "amazon-products".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 10 }
fn default_embedding_retries() -> u32 { 1 }
fn default_reranker_provider() -> String { "http".to_string() }
fn default_reranker_url() -> String { "http://localhost:8081".to_string() }
fn default_reranker_model() -> String { "BAAI/bge-reranker-base".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "shopsage".to_string() }

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            dense_limit: default_candidate_limit(),
            keyword_limit: default_candidate_limit(),
            fusion_limit: default_fusion_limit(),
            alpha: default_alpha(),
        }
    }
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            sentiment_weight: default_sentiment_weight(),
            popularity_weight: default_popularity_weight(),
            review_saturation: default_review_saturation(),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            keyword_index_path: default_keyword_index_path(),
            id_mapping_path: default_id_mapping_path(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_vector_store_url(),
            api_key: None,
            collection: default_collection(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            url: default_reranker_url(),
            model: default_reranker_model(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__ENGINE__ALPHA=0.7
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.engine.alpha) {
            return Err(ConfigError::Message(format!(
                "engine.alpha must be within [0, 1], got {}",
                self.engine.alpha
            )));
        }
        if self.engine.cache_capacity == 0 {
            return Err(ConfigError::Message(
                "engine.cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.rerank.review_saturation == 0 {
            return Err(ConfigError::Message(
                "rerank.review_saturation must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
