//! Ingestion progress accounting.
//!
//! Counts what a run has done so far and estimates the remaining embedding
//! time from a moving average of recent batch latencies.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Batches included in the moving average
pub const ETA_WINDOW: usize = 5;

/// Counters for one ingestion run; carried by aborts so partial work is visible
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionProgress {
    pub documents_listed: usize,
    pub documents_ingested: usize,
    pub chunks: usize,
    /// Chunks dropped for exceeding the text column limit
    pub chunks_skipped: usize,
    pub batches_embedded: usize,
    pub total_batches: usize,
    pub vectors_embedded: usize,
    pub rows_inserted: usize,
}

/// Moving-average ETA over embedding batches
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_batches: usize,
    completed: usize,
    recent: VecDeque<Duration>,
    window: usize,
}

impl ProgressTracker {
    pub fn new(total_batches: usize) -> Self {
        Self::with_window(total_batches, ETA_WINDOW)
    }

    pub fn with_window(total_batches: usize, window: usize) -> Self {
        Self {
            total_batches,
            completed: 0,
            recent: VecDeque::with_capacity(window),
            window: window.max(1),
        }
    }

    /// Record one finished batch
    pub fn record(&mut self, elapsed: Duration) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(elapsed);
        self.completed += 1;
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn remaining(&self) -> usize {
        self.total_batches.saturating_sub(self.completed)
    }

    /// Mean of the last `window` batch latencies
    pub fn average(&self) -> Option<Duration> {
        if self.recent.is_empty() {
            return None;
        }
        let total: Duration = self.recent.iter().sum();
        Some(total / self.recent.len() as u32)
    }

    /// Estimated time left; `None` before the first batch
    pub fn eta(&self) -> Option<Duration> {
        self.average().map(|avg| avg * self.remaining() as u32)
    }

    /// Share of batches done, 0.0 to 100.0
    pub fn percent(&self) -> f64 {
        if self.total_batches == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total_batches as f64 * 100.0
    }
}
