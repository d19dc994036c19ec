//! Ingestion processor
//!
//! Core logic for one ingestion run: recreate the collection, read and decode
//! every document, chunk, embed in batches with retry, verify counts, insert.
//! Everything runs sequentially; each remote call is awaited before the next.

use crate::chunker::{chunk_spans, ChunkingConfig};
use crate::errors::{IngestionError, Stage};
use crate::progress::{IngestionProgress, ProgressTracker};
use chrono::{DateTime, Utc};
use lorehunt_common::config::AppConfig;
use lorehunt_common::errors::{AppError, ErrorCode};
use lorehunt_common::storage::{decode, DocumentSource, Provenance, TextEncoding};
use lorehunt_common::vector::TEXT_MAX_LENGTH;
use lorehunt_common::{metrics, Embedder, IndexRow, RetryPolicy, VectorIndexManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A document that could not be read or decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub source: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub collection: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub progress: IngestionProgress,
    pub failures: Vec<DocumentFailure>,
    pub elapsed_secs: f64,
}

/// A chunk waiting to be embedded
#[derive(Debug, Clone)]
struct PendingChunk {
    text: String,
    provenance: Provenance,
}

/// Ingestion pipeline over one document source and one collection
pub struct IngestionPipeline {
    source: Arc<dyn DocumentSource>,
    embedder: Embedder,
    index: VectorIndexManager,
    collection: String,
    chunking: ChunkingConfig,
    encodings: Vec<TextEncoding>,
    embed_batch_size: usize,
    retry: RetryPolicy,
    fail_on_read_error: bool,
}

impl IngestionPipeline {
    /// Pipeline with default chunking, batching and retry settings
    pub fn new(
        source: Arc<dyn DocumentSource>,
        embedder: Embedder,
        index: VectorIndexManager,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            source,
            embedder,
            index,
            collection: collection.into(),
            chunking: ChunkingConfig::default(),
            encodings: TextEncoding::default_chain(),
            embed_batch_size: 100,
            retry: RetryPolicy::default(),
            fail_on_read_error: false,
        }
    }

    /// Pipeline tuned from application configuration
    pub fn from_config(
        config: &AppConfig,
        source: Arc<dyn DocumentSource>,
        embedder: Embedder,
        index: VectorIndexManager,
    ) -> Self {
        Self::new(source, embedder, index, config.vector_store.collection.clone())
            .with_chunking(ChunkingConfig::from(&config.ingestion))
            .with_encodings(config.storage.encodings.clone())
            .with_embed_batch_size(config.ingestion.embed_batch_size)
            .with_retry(config.retry_policy())
            .fail_on_read_error(config.ingestion.fail_on_read_error)
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_encodings(mut self, encodings: Vec<TextEncoding>) -> Self {
        self.encodings = encodings;
        self
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Abort the whole run on the first unreadable document
    pub fn fail_on_read_error(mut self, strict: bool) -> Self {
        self.fail_on_read_error = strict;
        self
    }

    /// Run the pipeline end to end
    #[instrument(skip(self), fields(collection = %self.collection))]
    pub async fn run(&self) -> Result<IngestionReport, IngestionError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut progress = IngestionProgress::default();
        let mut failures = Vec::new();

        info!(run_id = %run_id, model = self.embedder.model_name(), "Starting ingestion run");

        let outcome = self.execute(&mut progress, &mut failures).await;
        let elapsed_secs = timer.elapsed().as_secs_f64();
        metrics::record_ingestion(elapsed_secs, progress.chunks, outcome.is_ok());

        if let Err(e) = outcome {
            error!(run_id = %run_id, error = %e, "Ingestion run aborted");
            return Err(e);
        }

        info!(
            run_id = %run_id,
            documents = progress.documents_ingested,
            failures = failures.len(),
            chunks = progress.chunks,
            skipped = progress.chunks_skipped,
            rows = progress.rows_inserted,
            elapsed_secs = elapsed_secs,
            "Ingestion run complete"
        );

        Ok(IngestionReport {
            run_id,
            collection: self.collection.clone(),
            started_at,
            finished_at: Utc::now(),
            progress,
            failures,
            elapsed_secs,
        })
    }

    async fn execute(
        &self,
        progress: &mut IngestionProgress,
        failures: &mut Vec<DocumentFailure>,
    ) -> Result<(), IngestionError> {
        self.index
            .create_collection(&self.collection, self.embedder.dimension())
            .await
            .map_err(|e| IngestionError::aborted(Stage::CreateCollection, progress, e))?;

        let names = match self.source.list().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Failed to list documents, treating corpus as empty");
                Vec::new()
            }
        };
        progress.documents_listed = names.len();

        if names.is_empty() {
            info!("No documents to ingest");
            return Ok(());
        }

        let mut chunks = Vec::new();
        for name in &names {
            match self.load_document(name).await {
                Ok(document_chunks) => {
                    progress.documents_ingested += 1;
                    for chunk in document_chunks {
                        if chunk.text.len() > TEXT_MAX_LENGTH {
                            warn!(
                                source = %name,
                                bytes = chunk.text.len(),
                                limit = TEXT_MAX_LENGTH,
                                "Skipping chunk longer than the text column"
                            );
                            progress.chunks_skipped += 1;
                            continue;
                        }
                        chunks.push(chunk);
                    }
                }
                Err(e) if self.fail_on_read_error => {
                    return Err(IngestionError::aborted(Stage::Read, progress, e));
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Skipping unreadable document");
                    failures.push(DocumentFailure {
                        source: name.clone(),
                        code: e.code(),
                        message: e.to_string(),
                    });
                }
            }
        }
        progress.chunks = chunks.len();

        if chunks.is_empty() {
            info!(documents = progress.documents_ingested, "Documents produced no chunks");
            return Ok(());
        }

        let embeddings = self.embed_all(&chunks, progress).await?;

        verify_consistency(chunks.len(), embeddings.len())
            .map_err(|e| IngestionError::aborted(Stage::Verify, progress, e))?;

        // Row i carries chunk i; batch keys are the positions 0..N-1
        let rows: Vec<IndexRow> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexRow::new(chunk.text, vector, chunk.provenance))
            .collect();

        progress.rows_inserted = self
            .index
            .insert(&self.collection, &rows)
            .await
            .map_err(|e| IngestionError::aborted(Stage::Insert, progress, e))?;

        Ok(())
    }

    /// Read, decode and chunk one document
    async fn load_document(&self, name: &str) -> Result<Vec<PendingChunk>, AppError> {
        let document = self.source.fetch(name).await?;
        let (text, encoding) = decode(name, document.bytes(), &self.encodings)?;
        let provenance = document.provenance();

        let chunks: Vec<PendingChunk> = chunk_spans(&text, &self.chunking)
            .into_iter()
            .filter(|c| !c.content.trim().is_empty())
            .map(|c| PendingChunk {
                text: c.content,
                provenance: provenance.clone(),
            })
            .collect();

        debug!(
            source = name,
            encoding = %encoding,
            bytes = document.bytes().len(),
            chunks = chunks.len(),
            "Document chunked"
        );

        Ok(chunks)
    }

    async fn embed_all(
        &self,
        chunks: &[PendingChunk],
        progress: &mut IngestionProgress,
    ) -> Result<Vec<Vec<f32>>, IngestionError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let total_batches = texts.len().div_ceil(self.embed_batch_size);
        progress.total_batches = total_batches;

        let mut tracker = ProgressTracker::new(total_batches);
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.embed_batch_size).enumerate() {
            let started = Instant::now();

            let vectors = self
                .retry
                .run("embed_batch", || self.embedder.embed_batch(batch))
                .await
                .map_err(|e| IngestionError::aborted(Stage::Embed, progress, e))?;

            tracker.record(started.elapsed());
            progress.batches_embedded += 1;
            progress.vectors_embedded += vectors.len();
            embeddings.extend(vectors);

            info!(
                batch = i + 1,
                total_batches = total_batches,
                batch_size = batch.len(),
                percent = tracker.percent(),
                eta_secs = tracker.eta().map(|d| d.as_secs_f64()),
                "Embedded batch"
            );
        }

        Ok(embeddings)
    }
}

/// Every chunk must have exactly one vector
fn verify_consistency(chunks: usize, embeddings: usize) -> Result<(), AppError> {
    if chunks != embeddings {
        return Err(AppError::Consistency {
            expected: chunks,
            actual: embeddings,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lorehunt_common::embeddings::{EmbeddingBackend, HashEmbeddings};
    use lorehunt_common::storage::InMemorySource;
    use lorehunt_common::vector::InMemoryIndex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const DIM: usize = 16;
    const COLLECTION: &str = "data_sifhr";

    /// Hash embeddings that fail the calls whose ordinal is listed
    struct FlakyBackend {
        inner: HashEmbeddings,
        calls: AtomicU32,
        fail_calls: Vec<u32>,
        always_fail: bool,
    }

    impl FlakyBackend {
        fn failing_calls(fail_calls: Vec<u32>) -> Self {
            Self {
                inner: HashEmbeddings::new(DIM),
                calls: AtomicU32::new(0),
                fail_calls,
                always_fail: false,
            }
        }

        fn broken() -> Self {
            Self {
                always_fail: true,
                ..Self::failing_calls(Vec::new())
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for FlakyBackend {
        async fn embed_documents(&self, texts: &[String]) -> lorehunt_common::Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.always_fail || self.fail_calls.contains(&call) {
                return Err(AppError::Embedding {
                    message: "503 Service Unavailable".to_string(),
                });
            }
            self.inner.embed_documents(texts).await
        }

        async fn embed_query(&self, text: &str) -> lorehunt_common::Result<Vec<f32>> {
            self.inner.embed_query(text).await
        }

        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    /// Source whose listing always fails
    struct UnlistableSource;

    #[async_trait]
    impl DocumentSource for UnlistableSource {
        async fn list(&self) -> lorehunt_common::Result<Vec<String>> {
            Err(AppError::DocumentSource {
                message: "bucket does not exist".to_string(),
            })
        }

        async fn read(&self, _name: &str) -> lorehunt_common::Result<Vec<u8>> {
            unreachable!("nothing is listed")
        }

        fn bucket(&self) -> &str {
            "missing"
        }

        fn endpoint(&self) -> &str {
            "localhost:9000"
        }
    }

    /// Three documents, each splitting into exactly two chunks at size 30
    fn corpus() -> InMemorySource {
        InMemorySource::new("documents", "localhost:9000")
            .with_document("fez.txt", "The caravan left at dawn. Yusuf kept the old map.")
            .with_document("tangier.txt", "The harbour master laughed. He pointed at the tower.")
            .with_document("ceuta.txt", "A ledger lay on the desk. Page forty showed a key.")
    }

    fn pipeline(source: Arc<dyn DocumentSource>, backend: Arc<dyn EmbeddingBackend>) -> (IngestionPipeline, VectorIndexManager) {
        let retry = RetryPolicy::new(2, Duration::from_millis(1));
        let index = VectorIndexManager::new(Arc::new(InMemoryIndex::new()), 4, retry);
        let pipeline = IngestionPipeline::new(source, Embedder::new(backend), index.clone(), COLLECTION)
            .with_chunking(ChunkingConfig {
                chunk_size: 30,
                chunk_overlap: 0,
                split_oversized_tokens: false,
            })
            .with_embed_batch_size(4)
            .with_retry(retry);
        (pipeline, index)
    }

    #[tokio::test]
    async fn test_three_documents_six_rows() {
        let backend = Arc::new(HashEmbeddings::new(DIM));
        let (pipeline, index) = pipeline(Arc::new(corpus()), backend.clone());

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.documents_listed, 3);
        assert_eq!(report.progress.documents_ingested, 3);
        assert_eq!(report.progress.chunks, 6);
        assert_eq!(report.progress.total_batches, 2);
        assert_eq!(report.progress.rows_inserted, 6);
        assert!(report.failures.is_empty());
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 6);

        let sentence = "Yusuf kept the old map.";
        let vector = backend.embed_query(sentence).await.unwrap();
        let hits = index.search(COLLECTION, &vector, 1).await.unwrap();
        assert_eq!(hits[0].text, sentence);
        assert_eq!(hits[0].provenance.source, "fez.txt");
        assert_eq!(hits[0].provenance.minio_path, "minio://localhost:9000/documents/fez.txt");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_default_chunking_two_paragraph_documents() {
        let paragraph = |sentence: &str| sentence.repeat(5).trim_end().to_string();
        let document = |a: &str, b: &str| format!("{}\n\n{}", paragraph(a), paragraph(b));
        let source = InMemorySource::new("documents", "localhost:9000")
            .with_document(
                "fez.txt",
                document(
                    "The caravan of Yusuf crossed the dunes toward Fez at dawn. ",
                    "A tanner in the old medina sold him a map drawn on goatskin. ",
                ),
            )
            .with_document(
                "tangier.txt",
                document(
                    "Fishermen in Tangier spoke of a lantern that never went out. ",
                    "The harbour master kept a ledger of every ship that vanished. ",
                ),
            )
            .with_document(
                "ceuta.txt",
                document(
                    "Below the walls of Ceuta a stair led down into the sea cave. ",
                    "Its last step bore a carving of a key held by two lions. ",
                ),
            );

        let backend = Arc::new(HashEmbeddings::new(DIM));
        let index = VectorIndexManager::new(Arc::new(InMemoryIndex::new()), 1000, RetryPolicy::none());
        let pipeline = IngestionPipeline::new(Arc::new(source), Embedder::new(backend), index.clone(), COLLECTION)
            .with_chunking(ChunkingConfig::default())
            .with_retry(RetryPolicy::none());

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.chunks, 6);
        assert_eq!(report.progress.total_batches, 1);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_embedding_retry_succeeds_on_second_attempt() {
        let backend = Arc::new(FlakyBackend::failing_calls(vec![0]));
        let (pipeline, index) = pipeline(Arc::new(corpus()), backend.clone());

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.rows_inserted, 6);
        // Two batches plus one retry
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_second_embedding_failure_aborts() {
        let backend = Arc::new(FlakyBackend::broken());
        let (pipeline, index) = pipeline(Arc::new(corpus()), backend.clone());

        let err = assert_err!(pipeline.run().await);
        match err {
            IngestionError::Aborted { stage, progress, source } => {
                assert_eq!(stage, Stage::Embed);
                assert_eq!(progress.chunks, 6);
                assert_eq!(progress.batches_embedded, 0);
                assert!(matches!(source, AppError::Embedding { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_succeeds() {
        let source = InMemorySource::new("documents", "localhost:9000");
        let (pipeline, index) = pipeline(Arc::new(source), Arc::new(HashEmbeddings::new(DIM)));

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.documents_listed, 0);
        assert_eq!(report.progress.rows_inserted, 0);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_failure_is_empty_corpus() {
        let (pipeline, _) = pipeline(Arc::new(UnlistableSource), Arc::new(HashEmbeddings::new(DIM)));
        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.documents_listed, 0);
    }

    #[tokio::test]
    async fn test_undecodable_document_recorded() {
        let source = corpus().with_document("broken.bin", vec![0xff, 0xfe, 0x00]);
        let (pipeline, index) = pipeline(Arc::new(source), Arc::new(HashEmbeddings::new(DIM)));
        let pipeline = pipeline.with_encodings(vec![TextEncoding::Utf8]);

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.documents_listed, 4);
        assert_eq!(report.progress.documents_ingested, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "broken.bin");
        assert_eq!(report.failures[0].code, ErrorCode::DecodingError);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_on_read_failure() {
        let source = corpus().with_document("broken.bin", vec![0xff, 0xfe, 0x00]);
        let (pipeline, _) = pipeline(Arc::new(source), Arc::new(HashEmbeddings::new(DIM)));
        let pipeline = pipeline
            .with_encodings(vec![TextEncoding::Utf8])
            .fail_on_read_error(true);

        let err = assert_err!(pipeline.run().await);
        assert!(matches!(err, IngestionError::Aborted { stage: Stage::Read, .. }));
    }

    #[tokio::test]
    async fn test_latin1_document_ingested() {
        let source = InMemorySource::new("documents", "localhost:9000").with_document("cordoue.txt", b"Cordoue \xe9tait loin.".to_vec());
        let (pipeline, index) = pipeline(Arc::new(source), Arc::new(HashEmbeddings::new(DIM)));

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.rows_inserted, 1);

        let vector = HashEmbeddings::new(DIM).embed_query("Cordoue était loin.").await.unwrap();
        let hits = index.search(COLLECTION, &vector, 1).await.unwrap();
        assert_eq!(hits[0].text, "Cordoue était loin.");
    }

    #[tokio::test]
    async fn test_whitespace_chunks_skipped() {
        let source = InMemorySource::new("documents", "localhost:9000").with_document("blank.txt", "   \n\n   \n");
        let (pipeline, _) = pipeline(Arc::new(source), Arc::new(HashEmbeddings::new(DIM)));

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.documents_ingested, 1);
        assert_eq!(report.progress.chunks, 0);
    }

    #[tokio::test]
    async fn test_chunk_over_column_limit_skipped() {
        // One unbroken token larger than the text column
        let blob = "x".repeat(TEXT_MAX_LENGTH + 10);
        let source = InMemorySource::new("documents", "localhost:9000")
            .with_document("scroll.txt", format!("The scroll was sealed. {}", blob));
        let (pipeline, index) = pipeline(Arc::new(source), Arc::new(HashEmbeddings::new(DIM)));

        let report = assert_ok!(pipeline.run().await);
        assert_eq!(report.progress.documents_ingested, 1);
        assert_eq!(report.progress.chunks_skipped, 1);
        assert_eq!(report.progress.chunks, 1);
        assert_eq!(report.progress.rows_inserted, 1);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rerun_replaces_collection() {
        let (pipeline, index) = pipeline(Arc::new(corpus()), Arc::new(HashEmbeddings::new(DIM)));
        assert_ok!(pipeline.run().await);
        assert_ok!(pipeline.run().await);
        assert_eq!(index.row_count(COLLECTION).await.unwrap(), 6);
    }

    #[test]
    fn test_consistency_check() {
        assert!(verify_consistency(6, 6).is_ok());
        assert!(matches!(
            verify_consistency(6, 5),
            Err(AppError::Consistency { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = IngestionReport {
            run_id: Uuid::new_v4(),
            collection: COLLECTION.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            progress: IngestionProgress {
                chunks: 6,
                ..Default::default()
            },
            failures: Vec::new(),
            elapsed_secs: 0.5,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["chunks"], 6);
        assert_eq!(json["collection"], COLLECTION);
    }
}
