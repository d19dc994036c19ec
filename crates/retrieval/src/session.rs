//! Explicit session holding every retrieval-side component
//!
//! One `RagSession` is built per process and shared by reference. It owns
//! the embedder, index manager, language model, retrievers and gate, and
//! exposes the operations a hosting agent calls.

use crate::gate::{Admission, SimilarityGate, SimilarityVerdict};
use crate::retrieval::{Citation, MultiQueryRetriever, RetrievedChunk, VectorRetriever};
use chrono::{DateTime, Utc};
use lorehunt_common::embeddings::create_backend;
use lorehunt_common::errors::Result;
use lorehunt_common::llm::create_language_model;
use lorehunt_common::vector::MilvusIndex;
use lorehunt_common::{AppConfig, Embedder, LanguageModel, VectorIndexManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Reply used when retrieval found nothing to ground a scenario on
pub const NOTHING_FOUND: &str = "This information is not available in the consulted documents.";

/// Passages found for a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub passages: Vec<RetrievedChunk>,
    pub citations: Vec<Citation>,
    /// Passages formatted as numbered context for a prompt
    pub context: String,
    pub degraded: bool,
}

/// Generated treasure-hunt scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub question: String,
    pub text: String,
    pub citations: Vec<Citation>,
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

pub struct RagSession {
    retriever: MultiQueryRetriever,
    gate: SimilarityGate,
    llm: Arc<dyn LanguageModel>,
}

impl RagSession {
    /// Assemble a session from already-built parts
    pub fn new(
        embedder: Embedder,
        index: VectorIndexManager,
        llm: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Result<Self> {
        let vector = VectorRetriever::new(
            embedder.clone(),
            index.clone(),
            config.vector_store.collection.clone(),
            config.retrieval.top_k,
        );
        let retriever =
            MultiQueryRetriever::new(llm.clone(), Arc::new(vector))?.with_expansion(config.retrieval.multi_query);
        let gate = SimilarityGate::new(
            embedder,
            index,
            config.vector_store.scenario_collection.clone(),
            &config.gate,
        );

        Ok(Self { retriever, gate, llm })
    }

    /// Build every component from configuration and make sure the scenario
    /// collection exists
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = Embedder::with_dimension(create_backend(&config.embedding)?, config.embedding.dimension);
        let index = VectorIndexManager::new(
            Arc::new(MilvusIndex::new(&config.vector_store)?),
            config.vector_store.insert_batch_size,
            config.retry_policy(),
        );
        let llm = create_language_model(&config.llm)?;

        let created = index
            .ensure_collection(&config.vector_store.scenario_collection, embedder.dimension())
            .await?;

        info!(
            embedding_model = embedder.model_name(),
            llm_model = llm.model_name(),
            corpus = %config.vector_store.collection,
            scenarios = %config.vector_store.scenario_collection,
            scenario_collection_created = created,
            "RAG session ready"
        );

        Self::new(embedder, index, llm, config)
    }

    /// Retrieve passages for a query.
    ///
    /// Retrieval errors yield an empty, degraded outcome.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> SearchOutcome {
        match self.retriever.search(query).await {
            Ok(result) => SearchOutcome {
                query: result.query.clone(),
                citations: result.citations(),
                context: format_context(&result.chunks),
                degraded: result.degraded,
                passages: result.chunks,
            },
            Err(e) => {
                warn!(error = %e, "Retrieval failed, returning no passages");
                SearchOutcome {
                    query: query.to_string(),
                    passages: Vec::new(),
                    citations: Vec::new(),
                    context: String::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Retrieve context and ask the model for a scenario grounded on it
    #[instrument(skip(self))]
    pub async fn generate_scenario(&self, question: &str) -> Result<Scenario> {
        let outcome = self.search(question).await;

        let text = if outcome.passages.is_empty() {
            info!("No passages retrieved, skipping generation");
            NOTHING_FOUND.to_string()
        } else {
            self.llm.complete(&scenario_prompt(&outcome.context, question)).await?
        };

        Ok(Scenario {
            question: question.to_string(),
            text,
            citations: outcome.citations,
            degraded: outcome.degraded,
            generated_at: Utc::now(),
        })
    }

    pub async fn check(&self, candidate: &str) -> Result<SimilarityVerdict> {
        self.gate.check(candidate).await
    }

    pub async fn admit(&self, text: &str, title: Option<&str>, force: bool) -> Result<Admission> {
        self.gate.admit(text, title, force).await
    }

    /// Release the session. Clients hold no server-side state, so this only
    /// marks the end of the session in the logs.
    pub fn shutdown(self) {
        info!(scenario_collection = self.gate.collection(), "RAG session closed");
    }
}

/// Numbered passages with their source, best first
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] ({})\n{}", i + 1, chunk.provenance.source, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn scenario_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a game master writing immersive treasure-hunt quests drawn from \
         the history, legends and civilisations of the Arab-Muslim world.\n\n\
         Rules:\n\
         - Build the scenario only from the numbered passages below.\n\
         - When the passages do not hold the answer, reply exactly: \"{}\"\n\
         - Describe places, characters, objects and clues vividly, in bullets or narrative paragraphs.\n\
         - Mention passage numbers where a clue comes from.\n\n\
         PASSAGES:\n{}\n\n\
         PLAYER QUESTION: {}\n\n\
         SCENARIO:",
        NOTHING_FOUND, context, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorehunt_common::embeddings::{EmbeddingBackend, HashEmbeddings};
    use lorehunt_common::vector::InMemoryIndex;
    use lorehunt_common::{IndexRow, Provenance, RetryPolicy};
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    const DIM: usize = 64;

    /// Replies with paraphrases to expansion prompts and a fixed scenario otherwise
    struct ScriptedModel {
        paraphrases: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("PLAYER QUESTION") {
                Ok("Follow the lions to the fountain.".to_string())
            } else {
                Ok(self.paraphrases.clone())
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    async fn setup(corpus: &[(&str, &str)]) -> (RagSession, Arc<ScriptedModel>) {
        let config = AppConfig::default();
        let backend = Arc::new(HashEmbeddings::new(DIM));
        let index = VectorIndexManager::new(Arc::new(InMemoryIndex::new()), 100, RetryPolicy::none());
        index.create_collection(&config.vector_store.collection, DIM).await.unwrap();
        index
            .create_collection(&config.vector_store.scenario_collection, DIM)
            .await
            .unwrap();

        let texts: Vec<String> = corpus.iter().map(|(text, _)| text.to_string()).collect();
        let vectors = backend.embed_documents(&texts).await.unwrap();
        let rows: Vec<IndexRow> = corpus
            .iter()
            .zip(vectors)
            .map(|((text, source), vector)| {
                IndexRow::new(
                    text.to_string(),
                    vector,
                    Provenance {
                        source: source.to_string(),
                        minio_path: format!("minio://localhost:9000/documents/{}", source),
                        bucket: "documents".to_string(),
                        endpoint: "localhost:9000".to_string(),
                    },
                )
            })
            .collect();
        index.insert(&config.vector_store.collection, &rows).await.unwrap();

        let llm = Arc::new(ScriptedModel {
            paraphrases: "1. The fountain of lions\n2. Lion fountain legend".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let session = RagSession::new(Embedder::new(backend), index, llm.clone(), &config).unwrap();
        (session, llm)
    }

    const CORPUS: &[(&str, &str)] = &[
        ("The fountain of lions", "alhambra.txt"),
        ("Twelve stone lions carry the basin.", "alhambra.txt"),
        ("Caravans crossed the desert to Timbuktu.", "sahara.txt"),
    ];

    #[tokio::test]
    async fn test_search_returns_citations_and_context() {
        let (session, _) = setup(CORPUS).await;

        let outcome = session.search("Where is the fountain?").await;

        assert!(!outcome.degraded);
        assert_eq!(outcome.passages.len(), 3);
        assert_eq!(outcome.passages[0].text, "The fountain of lions");
        assert_eq!(outcome.citations[0].source, "alhambra.txt");
        assert_eq!(outcome.citations[0].minio_path, "minio://localhost:9000/documents/alhambra.txt");
        assert!(outcome.context.starts_with("[1] (alhambra.txt)\nThe fountain of lions"));
    }

    #[tokio::test]
    async fn test_search_degrades_on_retrieval_failure() {
        // No collections at all, so every sub-query fails
        let index = VectorIndexManager::new(Arc::new(InMemoryIndex::new()), 100, RetryPolicy::none());
        let llm = Arc::new(ScriptedModel {
            paraphrases: "another wording".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let embedder = Embedder::new(Arc::new(HashEmbeddings::new(DIM)));
        let session = RagSession::new(embedder, index, llm, &AppConfig::default()).unwrap();

        let outcome = session.search("anything").await;
        assert!(outcome.degraded);
        assert!(outcome.passages.is_empty());
        assert!(outcome.context.is_empty());

        let scenario = assert_ok!(session.generate_scenario("anything").await);
        assert_eq!(scenario.text, NOTHING_FOUND);
        assert!(scenario.degraded);
    }

    #[tokio::test]
    async fn test_generate_scenario_uses_numbered_context() {
        let (session, llm) = setup(CORPUS).await;

        let scenario = assert_ok!(session.generate_scenario("Tell me about the lions").await);

        assert_eq!(scenario.text, "Follow the lions to the fountain.");
        assert!(!scenario.citations.is_empty());
        let prompts = llm.prompts.lock().unwrap();
        let generation = prompts.last().unwrap();
        assert!(generation.contains("[1] (alhambra.txt)"));
        assert!(generation.contains("PLAYER QUESTION: Tell me about the lions"));
    }

    #[tokio::test]
    async fn test_generate_scenario_without_passages() {
        let (session, llm) = setup(&[]).await;

        let scenario = assert_ok!(session.generate_scenario("Where is the treasure?").await);

        assert_eq!(scenario.text, NOTHING_FOUND);
        assert!(scenario.citations.is_empty());
        assert!(llm.prompts.lock().unwrap().iter().all(|p| !p.contains("PLAYER QUESTION")));
    }

    #[tokio::test]
    async fn test_admit_then_check() {
        let (session, _) = setup(CORPUS).await;
        let text = "Beneath the twelve lions lies a copper map.";

        let admission = assert_ok!(session.admit(text, Some("copper-map"), false).await);
        assert!(admission.admitted);

        let verdict = assert_ok!(session.check(text).await);
        assert!(!verdict.can_auto_embed);

        session.shutdown();
    }

    #[test]
    fn test_session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RagSession>();
    }

    #[test]
    fn test_format_context_numbers_passages() {
        let chunk = |text: &str, source: &str| RetrievedChunk {
            row_id: 0,
            text: text.to_string(),
            provenance: Provenance {
                source: source.to_string(),
                ..Default::default()
            },
            score: 0.5,
        };
        let context = format_context(&[chunk(" first ", "a.txt"), chunk("second", "b.txt")]);
        assert_eq!(context, "[1] (a.txt)\nfirst\n\n[2] (b.txt)\nsecond");
    }
}
