//! In-memory [`VectorIndex`] for tests and offline runs.
//!
//! Search is brute-force cosine similarity over every stored row.

use super::{IndexRow, SearchHit, VectorIndex};
use crate::embeddings::cosine_similarity;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct StoredRow {
    id: i64,
    row: IndexRow,
}

struct Collection {
    dimension: usize,
    next_id: i64,
    rows: Vec<StoredRow>,
}

/// In-memory collections keyed by name
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(name: &str) -> AppError {
    AppError::index(name, "collection does not exist")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(AppError::index(name, "collection already exists"));
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                next_id: 0,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert(&self, name: &str, rows: &[IndexRow]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;

        // Validate the whole batch before writing any of it
        for row in rows {
            row.check_schema(name)?;
            if row.vector.len() != collection.dimension {
                return Err(AppError::DimensionMismatch {
                    expected: collection.dimension,
                    actual: row.vector.len(),
                });
            }
        }

        for row in rows {
            let id = collection.next_id;
            collection.next_id += 1;
            collection.rows.push(StoredRow { id, row: row.clone() });
        }

        Ok(rows.len())
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;

        if vector.len() != collection.dimension {
            return Err(AppError::DimensionMismatch {
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(f32, &StoredRow)> = collection
            .rows
            .iter()
            .map(|stored| (cosine_similarity(vector, &stored.row.vector), stored))
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, stored)| SearchHit {
                id: stored.id,
                text: stored.row.text.clone(),
                provenance: stored.row.provenance.clone(),
                score,
            })
            .collect())
    }

    async fn row_count(&self, name: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|c| c.rows.len())
            .ok_or_else(|| missing(name))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
