//! Lorehunt Retrieval
//!
//! Query side of the pipeline: multi-query retrieval over the ingested
//! corpus, scenario generation grounded on the retrieved passages, and the
//! similarity gate that keeps near-duplicate scenarios out of the index.

pub mod gate;
pub mod retrieval;
pub mod session;

pub use gate::{classify, Admission, GateStatus, SimilarMatch, SimilarityGate, SimilarityVerdict};
pub use retrieval::{
    merge_results, Citation, MultiQueryRetriever, RetrievalMode, RetrievalResult, RetrievedChunk, Retriever,
    VectorRetriever,
};
pub use session::{RagSession, Scenario, SearchOutcome};
