//! Similarity gate for generated scenarios
//!
//! Before a generated scenario is stored it is compared against the
//! scenarios already admitted. The gate only classifies; callers decide
//! whether to override a refusal with `force`.

use lorehunt_common::config::GateConfig;
use lorehunt_common::errors::{AppError, Result};
use lorehunt_common::vector::{SOURCE_MAX_LENGTH, TEXT_MAX_LENGTH};
use lorehunt_common::{metrics, Embedder, IndexRow, Provenance, SearchHit, VectorIndexManager};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

/// Stored scenario close to the candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub row_id: i64,
    pub source: String,
    pub text: String,
    pub score: f32,
}

impl From<SearchHit> for SimilarMatch {
    fn from(hit: SearchHit) -> Self {
        Self {
            row_id: hit.id,
            source: hit.provenance.source,
            text: hit.text,
            score: hit.score,
        }
    }
}

/// Classification of a candidate against stored scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityVerdict {
    /// At least one neighbour reached the low threshold
    pub has_duplicates: bool,

    /// Neighbours at or above the low threshold, best first
    pub similar: Vec<SimilarMatch>,

    /// The part of `similar` at or above the high threshold
    pub high_similarity: Vec<SimilarMatch>,

    /// True iff `high_similarity` is empty
    pub can_auto_embed: bool,
}

impl SimilarityVerdict {
    fn outcome(&self) -> &'static str {
        if !self.can_auto_embed {
            "high_similarity"
        } else if self.has_duplicates {
            "similar"
        } else {
            "clear"
        }
    }
}

/// Whether the gate ran before an admission decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateStatus {
    Checked { verdict: SimilarityVerdict },
    /// The check failed and the admission was forced through
    Skipped { reason: String },
}

/// Result of an admission request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admission {
    /// Scenario was embedded and inserted
    pub admitted: bool,
    pub forced: bool,
    /// Source recorded on the stored row
    pub source: String,
    pub gate: GateStatus,
}

/// Classify neighbours against the thresholds.
///
/// Hits keep their incoming order, which is best first.
pub fn classify(hits: Vec<SearchHit>, low: f32, high: f32) -> SimilarityVerdict {
    let similar: Vec<SimilarMatch> = hits
        .into_iter()
        .filter(|hit| hit.score >= low)
        .map(SimilarMatch::from)
        .collect();
    let high_similarity: Vec<SimilarMatch> = similar.iter().filter(|m| m.score >= high).cloned().collect();

    SimilarityVerdict {
        has_duplicates: !similar.is_empty(),
        can_auto_embed: high_similarity.is_empty(),
        similar,
        high_similarity,
    }
}

/// Duplicate detection over the scenario collection
#[derive(Clone)]
pub struct SimilarityGate {
    embedder: Embedder,
    index: VectorIndexManager,
    collection: String,
    low_threshold: f32,
    high_threshold: f32,
    candidates: usize,
}

impl SimilarityGate {
    pub fn new(embedder: Embedder, index: VectorIndexManager, collection: impl Into<String>, config: &GateConfig) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            candidates: config.candidates,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Compare a candidate against stored scenarios
    #[instrument(skip(self, candidate), fields(collection = %self.collection, len = candidate.len()))]
    pub async fn check(&self, candidate: &str) -> Result<SimilarityVerdict> {
        let vector = self.embedder.embed_one(candidate).await.map_err(similarity_error)?;
        self.check_vector(&vector).await
    }

    async fn check_vector(&self, vector: &[f32]) -> Result<SimilarityVerdict> {
        let hits = self
            .index
            .search(&self.collection, vector, self.candidates)
            .await
            .map_err(similarity_error)?;

        let verdict = classify(hits, self.low_threshold, self.high_threshold);
        metrics::record_gate(verdict.outcome());
        info!(
            similar = verdict.similar.len(),
            high_similarity = verdict.high_similarity.len(),
            can_auto_embed = verdict.can_auto_embed,
            "Similarity check complete"
        );

        Ok(verdict)
    }

    /// Check a scenario and store it when the gate allows it or `force` is set.
    ///
    /// The scenario is embedded once; the same vector is searched and stored.
    /// With `force`, a failing search is recorded as skipped and the scenario
    /// is still stored. Without a vector nothing can be stored, so an
    /// embedding failure is returned even when forced.
    #[instrument(skip(self, text), fields(collection = %self.collection))]
    pub async fn admit(&self, text: &str, title: Option<&str>, force: bool) -> Result<Admission> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput {
                message: "scenario text is empty".to_string(),
            });
        }
        if text.len() > TEXT_MAX_LENGTH {
            return Err(AppError::InvalidInput {
                message: format!("scenario text is {} bytes, limit is {}", text.len(), TEXT_MAX_LENGTH),
            });
        }

        let source = scenario_source(text, title);
        if source.len() > SOURCE_MAX_LENGTH {
            return Err(AppError::InvalidInput {
                message: format!("scenario title is {} bytes, limit is {}", source.len(), SOURCE_MAX_LENGTH),
            });
        }

        let vector = self.embedder.embed_one(text).await.map_err(similarity_error)?;

        let gate = match self.check_vector(&vector).await {
            Ok(verdict) => GateStatus::Checked { verdict },
            Err(e) if force => {
                warn!(error = %e, "Similarity check failed, admission forced");
                metrics::record_gate("skipped");
                GateStatus::Skipped { reason: e.to_string() }
            }
            Err(e) => return Err(e),
        };

        let allowed = match &gate {
            GateStatus::Checked { verdict } => verdict.can_auto_embed || force,
            GateStatus::Skipped { .. } => true,
        };

        if !allowed {
            metrics::record_gate("refused");
            info!(%source, "Scenario refused, too close to a stored scenario");
            return Ok(Admission {
                admitted: false,
                forced: false,
                source,
                gate,
            });
        }

        let row = IndexRow::new(
            text.to_string(),
            vector,
            Provenance {
                source: source.clone(),
                minio_path: format!("scenario://{}", source),
                bucket: String::new(),
                endpoint: "generated".to_string(),
            },
        );
        self.index.insert(&self.collection, std::slice::from_ref(&row)).await?;

        metrics::record_gate("admitted");
        info!(%source, forced = force, "Scenario admitted");

        Ok(Admission {
            admitted: true,
            forced: force,
            source,
            gate,
        })
    }
}

fn similarity_error(e: AppError) -> AppError {
    AppError::SimilarityCheck { message: e.to_string() }
}

/// Title when given, otherwise a name derived from the content hash
fn scenario_source(text: &str, title: Option<&str>) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => {
            let digest = hex::encode(Sha256::digest(text.as_bytes()));
            format!("scenario-{}", &digest[..12])
        }
    }
}
