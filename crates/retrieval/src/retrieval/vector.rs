//! Vector similarity search over one collection

use super::{RetrievalMode, RetrievedChunk, Retriever};
use lorehunt_common::errors::Result;
use lorehunt_common::{metrics, Embedder, VectorIndexManager};
use std::time::Instant;
use tracing::{debug, instrument};

/// Embeds the query and returns the `top_k` nearest chunks
pub struct VectorRetriever {
    embedder: Embedder,
    index: VectorIndexManager,
    collection: String,
    top_k: usize,
}

impl VectorRetriever {
    pub fn new(embedder: Embedder, index: VectorIndexManager, collection: impl Into<String>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            top_k,
        }
    }
}

#[async_trait::async_trait]
impl Retriever for VectorRetriever {
    #[instrument(skip(self), fields(collection = %self.collection, top_k = self.top_k))]
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();

        let vector = self.embedder.embed_one(query).await?;
        let hits = self.index.search(&self.collection, &vector, self.top_k).await?;
        let chunks: Vec<RetrievedChunk> = hits.into_iter().map(RetrievedChunk::from).collect();

        metrics::record_retrieval(start.elapsed().as_secs_f64(), self.mode().as_str(), chunks.len());
        debug!(results = chunks.len(), "Vector search complete");

        Ok(chunks)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Vector
    }
}
