//! Error types for ShopSage
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for each pipeline failure mode
//! - Stage and query context for caller-side logging and retry decisions
//! - Error codes for client handling

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Embedding,
    Dense,
    Keyword,
    Fusion,
    Records,
    Rerank,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Embedding => "embedding",
            Stage::Dense => "dense",
            Stage::Keyword => "keyword",
            Stage::Fusion => "fusion",
            Stage::Records => "records",
            Stage::Rerank => "rerank",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // External service errors (8xxx)
    RetrievalUnavailable,
    RerankUnavailable,
    EmbeddingError,
    VectorStoreError,
    UpstreamError,

    // Internal errors (9xxx)
    ArtifactError,
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::RetrievalUnavailable => 8001,
            ErrorCode::RerankUnavailable => 8002,
            ErrorCode::EmbeddingError => 8003,
            ErrorCode::VectorStoreError => 8004,
            ErrorCode::UpstreamError => 8005,

            ErrorCode::ArtifactError => 9001,
            ErrorCode::InternalError => 9002,
            ErrorCode::ConfigurationError => 9003,
            ErrorCode::SerializationError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Pipeline errors
    #[error("Retrieval unavailable at {stage} stage for query '{query}': {message}")]
    RetrievalUnavailable {
        stage: Stage,
        query: String,
        message: String,
    },

    #[error("Rerank unavailable for query '{query}': {message}")]
    RerankUnavailable { query: String, message: String },

    // Collaborator errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Vector store error: {message}")]
    VectorStoreError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Startup errors
    #[error("Artifact error at {path}: {message}")]
    Artifact { path: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Wrap a collaborator failure with the stage and query it interrupted
    pub fn retrieval(stage: Stage, query: &str, source: impl fmt::Display) -> Self {
        AppError::RetrievalUnavailable {
            stage,
            query: query.to_string(),
            message: source.to_string(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::RetrievalUnavailable { .. } => ErrorCode::RetrievalUnavailable,
            AppError::RerankUnavailable { .. } => ErrorCode::RerankUnavailable,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::VectorStoreError { .. } => ErrorCode::VectorStoreError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Artifact { .. } => ErrorCode::ArtifactError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Pipeline stage the error was raised in, when known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AppError::RetrievalUnavailable { stage, .. } => Some(*stage),
            AppError::RerankUnavailable { .. } => Some(Stage::Rerank),
            _ => None,
        }
    }

    /// Whether the caller can fall back to unranked fusion output
    pub fn is_degradable(&self) -> bool {
        matches!(self, AppError::RerankUnavailable { .. })
    }

    /// Check if this error was caused by the request itself
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }

    /// Check if this error is fatal at startup
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            AppError::Artifact { .. } | AppError::Configuration { .. }
        )
    }
}

/// Structured error body for callers that serialize failures
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl From<&AppError> for ErrorDetails {
    fn from(err: &AppError) -> Self {
        ErrorDetails {
            code: err.code(),
            message: err.to_string(),
            stage: err.stage(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::retrieval(Stage::Dense, "usb cable", "connection refused");
        assert_eq!(err.code(), ErrorCode::RetrievalUnavailable);
        assert_eq!(err.code().as_code(), 8001);
        assert_eq!(err.stage(), Some(Stage::Dense));
    }

    #[test]
    fn test_retrieval_error_carries_context() {
        let err = AppError::retrieval(Stage::Keyword, "usb cable", "index missing");
        let message = err.to_string();
        assert!(message.contains("keyword"));
        assert!(message.contains("usb cable"));
        assert!(message.contains("index missing"));
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "query too short".into(),
            field: Some("text".into()),
        };
        assert!(err.is_client_error());
        assert!(!err.is_degradable());
        assert_eq!(err.stage(), None);
    }

    #[test]
    fn test_only_rerank_failures_are_degradable() {
        let rerank = AppError::RerankUnavailable {
            query: "q".into(),
            message: "model down".into(),
        };
        assert!(rerank.is_degradable());
        assert_eq!(rerank.stage(), Some(Stage::Rerank));

        let dense = AppError::retrieval(Stage::Dense, "q", "down");
        assert!(!dense.is_degradable());
    }

    #[test]
    fn test_error_details_serialization() {
        let err = AppError::retrieval(Stage::Records, "lamp", "timeout");
        let details = ErrorDetails::from(&err);
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["code"], "RETRIEVAL_UNAVAILABLE");
        assert_eq!(json["stage"], "records");
    }
}
