//! Configuration management for Lorehunt
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Every section has defaults, so an empty environment yields a working
//! local setup (MinIO on :9000, Milvus on :19530).

use crate::errors::Result;
use crate::retry::RetryPolicy;
use crate::storage::TextEncoding;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    /// Object storage holding the source documents
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Vector store (Milvus) configuration
    #[validate(nested)]
    pub vector_store: VectorStoreConfig,

    /// Embedding backend configuration
    #[validate(nested)]
    pub embedding: EmbeddingConfig,

    /// Language model used for query expansion and generation
    #[validate(nested)]
    pub llm: LlmConfig,

    /// Ingestion pipeline tuning
    #[validate(nested)]
    pub ingestion: IngestionConfig,

    /// Retrieval tuning
    #[validate(nested)]
    pub retrieval: RetrievalConfig,

    /// Similarity gate thresholds
    #[validate(nested)]
    pub gate: GateConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// MinIO endpoint as host:port
    #[validate(length(min = 1))]
    pub endpoint: String,

    /// Bucket holding the corpus
    #[validate(length(min = 1))]
    pub bucket: String,

    pub access_key: String,

    pub secret_key: String,

    /// Region reported to the S3 client (MinIO ignores it)
    pub region: String,

    /// Use https when talking to the endpoint
    pub secure: bool,

    /// Read documents from a local directory instead of MinIO
    pub local_dir: Option<String>,

    /// Decoding fallback chain, tried in order
    #[validate(length(min = 1))]
    pub encodings: Vec<TextEncoding>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Milvus REST endpoint
    #[validate(length(min = 1))]
    pub url: String,

    /// Bearer token (user:password or API key)
    pub token: Option<String>,

    /// Collection holding the ingested corpus
    #[validate(length(min = 1))]
    pub collection: String,

    /// Collection holding admitted scenarios
    #[validate(length(min = 1))]
    pub scenario_collection: String,

    /// IVF list count used when building the index
    #[validate(range(min = 1))]
    pub nlist: u32,

    /// Lists probed per search
    #[validate(range(min = 1))]
    pub nprobe: u32,

    /// Rows per insert request
    #[validate(range(min = 1))]
    pub insert_batch_size: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: mistral, openai, hash
    #[validate(length(min = 1))]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    pub model: String,

    /// Embedding dimension, also the collection dimension
    #[validate(range(min = 1))]
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct LlmConfig {
    /// API key for the chat completions endpoint
    pub api_key: Option<String>,

    /// API base URL
    #[validate(length(min = 1))]
    pub api_base: String,

    /// Model to use
    pub model: String,

    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Output token cap (None lets the provider decide)
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_chunking"))]
pub struct IngestionConfig {
    /// Maximum chunk length in characters
    #[validate(range(min = 1))]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,

    /// Split words longer than chunk_size at character level
    pub split_oversized_tokens: bool,

    /// Texts per embedding request
    #[validate(range(min = 1))]
    pub embed_batch_size: usize,

    /// Attempts per batch, including the first one
    #[validate(range(min = 1))]
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds
    pub retry_delay_secs: u64,

    /// Abort the run when a document cannot be read or decoded
    pub fail_on_read_error: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned per sub-query
    #[validate(range(min = 1))]
    pub top_k: usize,

    /// Expand queries with language-model paraphrases
    pub multi_query: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_thresholds"))]
pub struct GateConfig {
    /// Minimum similarity reported as "similar"
    #[validate(range(min = -1.0, max = 1.0))]
    pub low_threshold: f32,

    /// Similarity at or above which auto-embedding is refused
    #[validate(range(min = -1.0, max = 1.0))]
    pub high_threshold: f32,

    /// Neighbours inspected per check
    #[validate(range(min = 1))]
    pub candidates: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,

    /// Service name attached to logs
    pub service_name: String,
}

fn validate_chunking(config: &IngestionConfig) -> std::result::Result<(), ValidationError> {
    if config.chunk_overlap >= config.chunk_size {
        return Err(ValidationError::new("chunk_overlap_not_smaller_than_chunk_size"));
    }
    Ok(())
}

fn validate_thresholds(config: &GateConfig) -> std::result::Result<(), ValidationError> {
    if config.low_threshold > config.high_threshold {
        return Err(ValidationError::new("low_threshold_above_high_threshold"));
    }
    Ok(())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".to_string(),
            bucket: "documents".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            secure: false,
            local_dir: None,
            encodings: TextEncoding::default_chain(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:19530".to_string(),
            token: None,
            collection: "data_sifhr".to_string(),
            scenario_collection: "scenarios_sifhr".to_string(),
            nlist: 1024,
            nprobe: 10,
            insert_batch_size: 1000,
            timeout_secs: 30,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "mistral".to_string(),
            api_key: None,
            api_base: None,
            model: "mistral-embed".to_string(),
            dimension: 1024,
            timeout_secs: 60,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.mistral.ai/v1".to_string(),
            model: "mistral-large-latest".to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            split_oversized_tokens: false,
            embed_batch_size: 100,
            max_attempts: 2,
            retry_delay_secs: 10,
            fail_on_read_error: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            multi_query: true,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.5,
            high_threshold: 0.65,
            candidates: 5,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: true,
            metrics_port: 0,
            service_name: "lorehunt".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Root span for a binary; events recorded inside it carry the service name
    pub fn service_span(&self) -> tracing::Span {
        tracing::info_span!("service", service = %self.service_name)
    }
}

impl AppConfig {
    /// Load configuration from environment and files, then validate it
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__VECTOR_STORE__URL=http://milvus:19530
            .add_source(Self::environment())
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("storage.encodings")
    }

    /// Fixed delay between attempts of a failed batch
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.ingestion.retry_delay_secs)
    }

    /// Retry policy shared by embedding and insert batches
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.ingestion.max_attempts, self.retry_delay())
    }
}
