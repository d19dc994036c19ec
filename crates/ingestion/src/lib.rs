//! Lorehunt Ingestion
//!
//! Reads a document corpus, cuts it into overlapping chunks, embeds the
//! chunks in batches and writes them to a freshly created collection.

pub mod chunker;
pub mod errors;
pub mod processor;
pub mod progress;

pub use chunker::{chunk, chunk_spans, reassemble, ChunkingConfig, TextChunk};
pub use errors::{IngestionError, Stage};
pub use processor::{DocumentFailure, IngestionPipeline, IngestionReport};
pub use progress::{IngestionProgress, ProgressTracker};
