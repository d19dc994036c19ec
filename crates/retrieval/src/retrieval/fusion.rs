//! Merging result lists from several sub-queries
//!
//! Chunks are identified by (text, source). A chunk found by more than one
//! sub-query is kept once with the best score it reached.

use super::RetrievedChunk;
use std::collections::HashMap;

/// Merge result lists, dedupe by chunk identity and sort by score descending.
///
/// Ties keep the order in which chunks were first seen.
pub fn merge_results(lists: Vec<Vec<RetrievedChunk>>) -> Vec<RetrievedChunk> {
    let mut merged: Vec<RetrievedChunk> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for chunk in lists.into_iter().flatten() {
        let key = (chunk.text.clone(), chunk.provenance.source.clone());
        match positions.get(&key) {
            Some(&pos) => {
                if chunk.score > merged[pos].score {
                    merged[pos].score = chunk.score;
                    merged[pos].row_id = chunk.row_id;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(chunk);
            }
        }
    }

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged
}
