//! Retrieval over the ingested corpus
//!
//! Two retrievers share one trait:
//! - [`VectorRetriever`] embeds the query and searches one collection
//! - [`MultiQueryRetriever`] expands the query into paraphrases, runs the
//!   underlying retriever for each and merges the results

mod fusion;
mod multi_query;
mod vector;

pub use fusion::merge_results;
pub use multi_query::MultiQueryRetriever;
pub use vector::VectorRetriever;

use lorehunt_common::errors::Result;
use lorehunt_common::{Provenance, SearchHit};
use serde::{Deserialize, Serialize};

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Primary key of the stored row
    pub row_id: i64,

    /// Chunk content
    pub text: String,

    /// Source document metadata
    pub provenance: Provenance,

    /// Cosine similarity to the query that found it
    pub score: f32,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            row_id: hit.id,
            text: hit.text,
            provenance: hit.provenance,
            score: hit.score,
        }
    }
}

impl RetrievedChunk {
    pub fn citation(&self) -> Citation {
        Citation {
            row_id: self.row_id,
            source: self.provenance.source.clone(),
            minio_path: self.provenance.minio_path.clone(),
            score: self.score,
        }
    }
}

/// Structured reference to the passage a piece of text was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub row_id: i64,
    pub source: String,
    pub minio_path: String,
    pub score: f32,
}

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// One query, one vector search
    Vector,
    /// Paraphrase expansion plus merge
    MultiQuery,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Vector => "vector",
            RetrievalMode::MultiQuery => "multi_query",
        }
    }
}

/// Outcome of one retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The query as asked
    pub query: String,

    /// Every query actually issued, the original first
    pub expanded_queries: Vec<String>,

    /// Merged chunks, best first
    pub chunks: Vec<RetrievedChunk>,

    /// Expansion failed or some sub-query failed
    pub degraded: bool,
}

impl RetrievalResult {
    pub fn citations(&self) -> Vec<Citation> {
        self.chunks.iter().map(RetrievedChunk::citation).collect()
    }
}

/// Common trait for single-query retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks matching the query, best first
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>>;

    /// Get the retrieval mode
    fn mode(&self) -> RetrievalMode;
}
