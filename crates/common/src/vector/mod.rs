//! Vector index management
//!
//! [`VectorIndex`] is the storage seam with two implementations:
//! - [`MilvusIndex`] - Milvus over its REST v2 API
//! - [`InMemoryIndex`] - brute-force cosine search, for tests and offline runs
//!
//! [`VectorIndexManager`] adds collection lifecycle, insert batching and
//! per-batch retry on top of either.

mod memory;
mod milvus;

pub use memory::InMemoryIndex;
pub use milvus::MilvusIndex;

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::storage::Provenance;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Collection schema limits (VARCHAR max lengths, in bytes)
pub const TEXT_MAX_LENGTH: usize = 65_535;
pub const SOURCE_MAX_LENGTH: usize = 1024;
pub const MINIO_PATH_MAX_LENGTH: usize = 2048;
pub const BUCKET_MAX_LENGTH: usize = 256;
pub const ENDPOINT_MAX_LENGTH: usize = 256;

/// Fields returned with every search hit
pub const OUTPUT_FIELDS: &[&str] = &["text", "source", "minio_path", "bucket", "endpoint"];

/// One row to insert. The primary key is assigned by the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl IndexRow {
    pub fn new(text: String, vector: Vec<f32>, provenance: Provenance) -> Self {
        Self {
            text,
            vector,
            provenance,
        }
    }

    /// Reject rows the collection schema would refuse.
    ///
    /// The error is permanent: resending the same row cannot succeed.
    pub fn check_schema(&self, collection: &str) -> Result<()> {
        let fields = [
            ("text", self.text.len(), TEXT_MAX_LENGTH),
            ("source", self.provenance.source.len(), SOURCE_MAX_LENGTH),
            ("minio_path", self.provenance.minio_path.len(), MINIO_PATH_MAX_LENGTH),
            ("bucket", self.provenance.bucket.len(), BUCKET_MAX_LENGTH),
            ("endpoint", self.provenance.endpoint.len(), ENDPOINT_MAX_LENGTH),
        ];

        for (field, len, max) in fields {
            if len > max {
                return Err(AppError::InvalidInput {
                    message: format!(
                        "row for {}: field {} is {} bytes, limit is {}",
                        collection, field, len, max
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A stored row matched by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: i64,
    pub text: String,
    pub provenance: Provenance,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

/// Trait for vector collection storage
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Create a collection that does not exist yet
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Insert one batch, returning the number of rows written
    async fn insert(&self, name: &str, rows: &[IndexRow]) -> Result<usize>;

    /// Nearest rows by cosine similarity, best first
    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    async fn row_count(&self, name: &str) -> Result<usize>;

    fn backend_name(&self) -> &str;
}

/// Collection lifecycle, batched insert and search
#[derive(Clone)]
pub struct VectorIndexManager {
    index: Arc<dyn VectorIndex>,
    insert_batch_size: usize,
    retry: RetryPolicy,
}

impl VectorIndexManager {
    pub fn new(index: Arc<dyn VectorIndex>, insert_batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            index,
            insert_batch_size: insert_batch_size.max(1),
            retry,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Drop the collection if it exists, then create it empty.
    #[instrument(skip(self), fields(backend = self.index.backend_name()))]
    pub async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let existed = self.index.has_collection(name).await?;

        warn!(
            collection = name,
            dimension = dimension,
            existed = existed,
            "Recreating collection, all stored rows are discarded"
        );

        if existed {
            self.index.drop_collection(name).await?;
        }
        self.index.create_collection(name, dimension).await
    }

    /// Create the collection only if it is missing. Returns true when created.
    pub async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<bool> {
        if self.index.has_collection(name).await? {
            debug!(collection = name, "Collection already exists");
            return Ok(false);
        }

        info!(collection = name, dimension = dimension, "Creating collection");
        self.index.create_collection(name, dimension).await?;
        Ok(true)
    }

    /// Insert all rows in batches, retrying each batch on its own.
    ///
    /// Batches already written stay written when a later batch fails.
    #[instrument(skip(self, rows), fields(rows = rows.len(), batch_size = self.insert_batch_size))]
    pub async fn insert(&self, name: &str, rows: &[IndexRow]) -> Result<usize> {
        let total_batches = rows.len().div_ceil(self.insert_batch_size);
        let mut inserted = 0;

        for (batch_index, batch) in rows.chunks(self.insert_batch_size).enumerate() {
            let start = batch_index * self.insert_batch_size;
            let written = self
                .retry
                .run("insert_batch", || self.index.insert(name, batch))
                .await?;

            inserted += written;
            metrics::record_insert(name, written);
            info!(
                collection = name,
                batch = batch_index + 1,
                total_batches = total_batches,
                first_row = start,
                last_row = start + batch.len() - 1,
                "Inserted batch"
            );
        }

        Ok(inserted)
    }

    /// `limit` nearest rows; an empty collection yields no hits
    pub async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.index.search(name, vector, limit).await
    }

    pub async fn row_count(&self, name: &str) -> Result<usize> {
        self.index.row_count(name).await
    }
}
