//! Multi-query retrieval
//!
//! The language model rewrites the question into alternative phrasings.
//! The underlying retriever runs once per phrasing and the result lists are
//! merged, which widens recall for vaguely worded questions.

use super::{merge_results, RetrievalMode, RetrievalResult, RetrievedChunk, Retriever};
use lorehunt_common::errors::{AppError, Result};
use lorehunt_common::{metrics, LanguageModel};
use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Leading list markers the model tends to add: "1.", "2)", "-", "*", "•"
const LIST_MARKER: &str = r"^\s*(?:\d+[.)]|[-*•])\s*";

/// Expands a query into paraphrases and merges their results
pub struct MultiQueryRetriever {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    list_marker: Regex,
    expand: bool,
}

impl MultiQueryRetriever {
    pub fn new(llm: Arc<dyn LanguageModel>, retriever: Arc<dyn Retriever>) -> Result<Self> {
        let list_marker = Regex::new(LIST_MARKER).map_err(|e| AppError::Internal {
            message: format!("invalid list marker pattern: {}", e),
        })?;

        Ok(Self {
            llm,
            retriever,
            list_marker,
            expand: true,
        })
    }

    /// Disable expansion to issue the original query only
    pub fn with_expansion(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    /// Ask the model for paraphrases of `query`
    pub async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let response = self.llm.complete(&expansion_prompt(query)).await?;
        Ok(self.parse_paraphrases(query, &response))
    }

    /// One paraphrase per non-empty line, markers stripped, duplicates and
    /// echoes of the original dropped. Order is kept.
    pub fn parse_paraphrases(&self, original: &str, response: &str) -> Vec<String> {
        let original = original.trim().to_lowercase();
        let mut seen = HashSet::new();

        response
            .lines()
            .map(|line| self.list_marker.replace(line, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .filter(|line| line.to_lowercase() != original)
            .filter(|line| seen.insert(line.to_lowercase()))
            .collect()
    }

    /// Retrieve for the query and each paraphrase, then merge
    #[instrument(skip(self), fields(mode = "multi_query"))]
    pub async fn search(&self, query: &str) -> Result<RetrievalResult> {
        let start = Instant::now();
        let mut degraded = false;

        let mut queries = vec![query.to_string()];
        if self.expand {
            match self.expand(query).await {
                Ok(paraphrases) => {
                    debug!(count = paraphrases.len(), "Query expanded");
                    queries.extend(paraphrases);
                }
                Err(e) => {
                    warn!(error = %e, "Query expansion failed, using the original query only");
                    degraded = true;
                }
            }
        }

        let mut lists = Vec::with_capacity(queries.len());
        let mut last_error = None;
        for sub_query in &queries {
            match self.retriever.retrieve(sub_query).await {
                Ok(chunks) => lists.push(chunks),
                Err(e) => {
                    warn!(query = %sub_query, error = %e, "Sub-query failed, skipping");
                    degraded = true;
                    last_error = Some(e);
                }
            }
        }

        if lists.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let chunks = merge_results(lists);

        metrics::record_retrieval(start.elapsed().as_secs_f64(), RetrievalMode::MultiQuery.as_str(), chunks.len());
        info!(
            queries = queries.len(),
            results = chunks.len(),
            degraded,
            "Multi-query retrieval complete"
        );

        Ok(RetrievalResult {
            query: query.to_string(),
            expanded_queries: queries,
            chunks,
            degraded,
        })
    }
}

#[async_trait::async_trait]
impl Retriever for MultiQueryRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        Ok(self.search(query).await?.chunks)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::MultiQuery
    }
}

fn expansion_prompt(query: &str) -> String {
    format!(
        "You help search a collection of legends, folk tales and historical notes.\n\
         Rewrite the question below in three different ways so that together the \
         versions cover other wordings of the same need.\n\
         Answer with one version per line and nothing else.\n\n\
         Question: {}",
        query
    )
}
