//! Embedding service abstraction
//!
//! Backends implement [`EmbeddingBackend`]:
//! - [`HostedEmbeddings`] - OpenAI-compatible `/embeddings` API (Mistral by default)
//! - [`HashEmbeddings`] - deterministic SHA-256 vectors, no network
//!
//! Callers go through [`Embedder`], which checks vector counts and
//! dimensions and records metrics. The backend is picked once by
//! [`create_backend`].

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MISTRAL_API_BASE: &str = "https://api.mistral.ai/v1";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of documents, one vector per text, in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Hosted embeddings client
pub struct HostedEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingResponse {
    /// Vectors in request order; providers may return them shuffled
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

impl HostedEmbeddings {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Embedding {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: EmbeddingResponse = response.json().await.map_err(|e| AppError::Embedding {
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(result.into_vectors())
    }
}

#[async_trait]
impl EmbeddingBackend for HostedEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.make_request(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.make_request(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::Embedding {
            message: "Empty response".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embeddings derived from SHA-256.
///
/// Identical texts map to identical vectors; anything else is close to
/// orthogonal. Useful offline and in tests, useless for semantic search.
pub struct HashEmbeddings {
    dimension: usize,
}

impl HashEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimension);
        let mut block: u32 = 0;

        while values.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();

            values.extend(digest.iter().map(|&b| f32::from(b) / 255.0 * 2.0 - 1.0));
            block += 1;
        }

        values.truncate(self.dimension);
        values
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn model_name(&self) -> &str {
        "sha256-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create the configured embedding backend
pub fn create_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let hosted = |default_base: &str| -> Result<Arc<dyn EmbeddingBackend>> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: format!("embedding.api_key is required for provider {}", config.provider),
        })?;
        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| default_base.to_string());

        Ok(Arc::new(HostedEmbeddings::new(
            api_key,
            config.model.clone(),
            base_url,
            config.dimension,
            timeout,
        )?))
    };

    match config.provider.as_str() {
        "mistral" => hosted(MISTRAL_API_BASE),
        "openai" => hosted(OPENAI_API_BASE),
        "hash" => {
            tracing::warn!(dimension = config.dimension, "Using hash embeddings, retrieval will not be semantic");
            Ok(Arc::new(HashEmbeddings::new(config.dimension)))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

/// Validating front for an [`EmbeddingBackend`].
///
/// Never pads or truncates: a vector of the wrong length is an error.
#[derive(Clone)]
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    dimension: usize,
}

impl Embedder {
    /// Validate against the backend's own dimension
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        let dimension = backend.dimension();
        Self { backend, dimension }
    }

    /// Validate against an explicit dimension (e.g. an existing collection)
    pub fn with_dimension(backend: Arc<dyn EmbeddingBackend>, dimension: usize) -> Self {
        Self { backend, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Embed a batch; exactly one vector of the configured dimension per text
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let result = self
            .backend
            .embed_documents(texts)
            .await
            .map_err(into_embedding_error)
            .and_then(|vectors| {
                if vectors.len() != texts.len() {
                    return Err(AppError::Embedding {
                        message: format!("Backend returned {} vectors for {} texts", vectors.len(), texts.len()),
                    });
                }
                for vector in &vectors {
                    self.check_dimension(vector)?;
                }
                Ok(vectors)
            });

        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            self.backend.model_name(),
            texts.len(),
            result.is_ok(),
        );

        result
    }

    /// Embed a single query text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = self
            .backend
            .embed_query(text)
            .await
            .map_err(into_embedding_error)
            .and_then(|vector| {
                self.check_dimension(&vector)?;
                Ok(vector)
            });

        metrics::record_embedding(start.elapsed().as_secs_f64(), self.backend.model_name(), 1, result.is_ok());

        result
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn into_embedding_error(err: AppError) -> AppError {
    match err {
        AppError::Embedding { .. } | AppError::DimensionMismatch { .. } => err,
        other => AppError::Embedding {
            message: other.to_string(),
        },
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
