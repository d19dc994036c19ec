//! In-memory document source.

use super::DocumentSource;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Fixed set of documents, listed in name order
pub struct InMemorySource {
    documents: BTreeMap<String, Vec<u8>>,
    bucket: String,
    endpoint: String,
}

impl InMemorySource {
    pub fn new(bucket: &str, endpoint: &str) -> Self {
        Self {
            documents: BTreeMap::new(),
            bucket: bucket.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Add a document, replacing any document with the same name
    pub fn with_document(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(name.to_string(), bytes.into());
        self
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.documents
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::DocumentSource {
                message: format!("No such document: {}", name),
            })
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
