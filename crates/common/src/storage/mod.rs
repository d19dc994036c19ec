//! Document sources
//!
//! A [`DocumentSource`] lists document names and reads their raw bytes.
//! Three implementations are provided:
//! - [`MinioSource`] - any S3-compatible object store (MinIO in production)
//! - [`LocalDirSource`] - files in a local directory
//! - [`InMemorySource`] - fixed documents, for tests and embedding callers
//!
//! Decoding raw bytes into text goes through an ordered encoding chain,
//! see [`decode`].

mod encoding;
mod local;
mod memory;
mod minio;

pub use encoding::{decode, TextEncoding};
pub use local::LocalDirSource;
pub use memory::InMemorySource;
pub use minio::MinioSource;

use crate::config::StorageConfig;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A document read from a source. Immutable once read.
#[derive(Debug, Clone)]
pub struct Document {
    /// Object name inside the bucket
    pub name: String,
    /// Canonical storage path, e.g. `minio://localhost:9000/documents/a.txt`
    pub path: String,
    pub bucket: String,
    pub endpoint: String,
    bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: String, path: String, bucket: String, endpoint: String, bytes: Vec<u8>) -> Self {
        Self {
            name,
            path,
            bucket,
            endpoint,
            bytes,
        }
    }

    /// Raw content
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Provenance attached to every chunk cut from this document
    pub fn provenance(&self) -> Provenance {
        Provenance {
            source: self.name.clone(),
            minio_path: self.path.clone(),
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

/// Where a stored row came from. Field names follow the collection schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub minio_path: String,
    pub bucket: String,
    pub endpoint: String,
}

/// Trait for document enumeration and retrieval
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Names of all documents available to ingest
    async fn list(&self) -> Result<Vec<String>>;

    /// Raw bytes of one document
    async fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Bucket (or directory) the documents live in
    fn bucket(&self) -> &str;

    /// Endpoint the documents are served from
    fn endpoint(&self) -> &str;

    /// Canonical path recorded in chunk metadata
    fn canonical_path(&self, name: &str) -> String {
        format!("minio://{}/{}/{}", self.endpoint(), self.bucket(), name)
    }

    /// Read a document together with its provenance
    async fn fetch(&self, name: &str) -> Result<Document> {
        let bytes = self.read(name).await?;
        Ok(Document::new(
            name.to_string(),
            self.canonical_path(name),
            self.bucket().to_string(),
            self.endpoint().to_string(),
            bytes,
        ))
    }
}

/// Source selected by configuration: a local directory when
/// `storage.local_dir` is set, MinIO otherwise
pub async fn create_document_source(config: &StorageConfig) -> Result<Arc<dyn DocumentSource>> {
    match &config.local_dir {
        Some(dir) => {
            tracing::info!(dir = %dir, "Reading documents from local directory");
            Ok(Arc::new(LocalDirSource::new(dir)))
        }
        None => Ok(Arc::new(MinioSource::new(config).await?)),
    }
}
