//! Error types for Lorehunt
//!
//! Provides a single error taxonomy shared by ingestion and retrieval:
//! - Distinct variants for each failure domain (decoding, embedding,
//!   consistency, vector index, similarity gate, upstream services)
//! - Machine-readable error codes for run reports
//! - Retry classification used by [`crate::retry::RetryPolicy`]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors (1xxx)
    DecodingError,
    InvalidInput,

    // Pipeline consistency (2xxx)
    ConsistencyError,

    // External service errors (8xxx)
    EmbeddingError,
    DimensionMismatch,
    IndexError,
    SimilarityCheckError,
    DocumentSourceError,
    LanguageModelError,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::DecodingError => 1001,
            ErrorCode::InvalidInput => 1002,

            ErrorCode::ConsistencyError => 2001,

            ErrorCode::EmbeddingError => 8001,
            ErrorCode::DimensionMismatch => 8002,
            ErrorCode::IndexError => 8003,
            ErrorCode::SimilarityCheckError => 8004,
            ErrorCode::DocumentSourceError => 8005,
            ErrorCode::LanguageModelError => 8006,
            ErrorCode::UpstreamError => 8007,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Input errors
    #[error("Document {source_name} could not be decoded with any of: {}", tried.join(", "))]
    Decoding {
        source_name: String,
        tried: Vec<String>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    // Consistency errors
    #[error("Consistency error: {expected} chunks but {actual} embeddings")]
    Consistency { expected: usize, actual: usize },

    // External service errors
    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index error on collection {collection}: {message}")]
    Index { collection: String, message: String },

    #[error("Similarity check failed: {message}")]
    SimilarityCheck { message: String },

    #[error("Document source error: {message}")]
    DocumentSource { message: String },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for an index error on a named collection
    pub fn index(collection: &str, message: impl Into<String>) -> Self {
        AppError::Index {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Decoding { .. } => ErrorCode::DecodingError,
            AppError::InvalidInput { .. } => ErrorCode::InvalidInput,
            AppError::Consistency { .. } => ErrorCode::ConsistencyError,
            AppError::Embedding { .. } => ErrorCode::EmbeddingError,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::Index { .. } => ErrorCode::IndexError,
            AppError::SimilarityCheck { .. } => ErrorCode::SimilarityCheckError,
            AppError::DocumentSource { .. } => ErrorCode::DocumentSourceError,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a failed operation may succeed if attempted again.
    ///
    /// Remote-service failures are transient. Input, consistency and
    /// configuration failures are permanent and must surface immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Embedding { .. }
                | AppError::DimensionMismatch { .. }
                | AppError::Index { .. }
                | AppError::DocumentSource { .. }
                | AppError::LanguageModel { .. }
                | AppError::HttpClient(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::DocumentSource {
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
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
