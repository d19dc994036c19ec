//! Lorehunt Common Library
//!
//! Shared code for the ingestion and retrieval crates including:
//! - Configuration management
//! - Error types and retry classification
//! - Embedding backends and the validating embedder
//! - Language model client
//! - Vector index (Milvus and in-memory) and its manager
//! - Document sources and text decoding
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retry;
pub mod storage;
pub mod vector;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::{EmbeddingBackend, Embedder};
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use retry::RetryPolicy;
pub use storage::{Document, DocumentSource, Provenance};
pub use vector::{IndexRow, SearchHit, VectorIndex, VectorIndexManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
