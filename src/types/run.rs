//! Run-scoped statistics for batch and stream runs.
//!
//! These are created at the start of a run, finalised at its end and owned
//! by that run alone. Nothing here is persisted.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::AnalysisResult;

/// Counters for one batch run (sequential or parallel).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingStats {
    pub total_items: usize,
    /// Items that completed successfully.
    pub processed_items: usize,
    pub failed_items: usize,
    /// Items never started because the run was cancelled or timed out.
    pub skipped_items: usize,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub duration: Duration,
    pub workers_used: usize,
    pub batch_size: usize,
    pub batch_count: usize,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl ProcessingStats {
    /// Fresh stats for a run over `total_items` starting now.
    pub fn start(total_items: usize) -> Self {
        let now = SystemTime::now();
        Self {
            total_items,
            processed_items: 0,
            failed_items: 0,
            skipped_items: 0,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            workers_used: 0,
            batch_size: 0,
            batch_count: 0,
            cancelled: false,
            timed_out: false,
        }
    }

    /// Stamp the end time and derive the skipped count.
    pub fn finish(&mut self) {
        self.end_time = SystemTime::now();
        self.duration = self
            .end_time
            .duration_since(self.start_time)
            .unwrap_or_default();
        self.skipped_items = self
            .total_items
            .saturating_sub(self.processed_items + self.failed_items);
    }

    /// Fraction of items that succeeded; 0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total_items == 0 {
            0.0
        } else {
            self.processed_items as f64 / self.total_items as f64
        }
    }

    /// True when every item succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.processed_items == self.total_items
    }
}

/// One failed item of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemError {
    /// Position of the document in the submitted batch.
    pub index: usize,
    /// Short label identifying the document.
    pub document: String,
    pub message: String,
}

/// Results, failures and statistics of a batch run.
///
/// `results` carries no ordering guarantee for parallel runs; each item is
/// attributable to its source through its own `document` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult<T> {
    pub results: Vec<T>,
    pub errors: Vec<ItemError>,
    pub stats: ProcessingStats,
}

/// Per-chunk outcome retained by the streaming analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkResult {
    /// Zero-based chunk position in the stream.
    pub index: usize,
    /// First line (zero-based) contained in the chunk.
    pub start_line: usize,
    pub line_count: usize,
    pub token_count: usize,
    pub metrics: BTreeMap<String, f64>,
}

impl ChunkResult {
    pub fn from_analysis(index: usize, start_line: usize, line_count: usize, result: &AnalysisResult) -> Self {
        Self {
            index,
            start_line,
            line_count,
            token_count: result.token_count,
            metrics: result.metric_values(),
        }
    }
}

/// A chunk that failed to analyze.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkError {
    pub index: usize,
    pub start_line: usize,
    pub message: String,
}

/// Aggregate outcome of a stream run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResult {
    pub tokenizer: String,
    pub total_chunks: usize,
    pub successful_chunks: usize,
    pub failed_chunks: usize,
    pub total_lines: usize,
    pub total_bytes: u64,
    pub total_tokens: usize,
    /// Per-metric arithmetic mean across successful chunks.
    pub aggregated_metrics: BTreeMap<String, f64>,
    /// Per-chunk metrics in stream order. Empty when retention is disabled.
    pub chunk_results: Vec<ChunkResult>,
    pub chunk_errors: Vec<ChunkError>,
    pub start_time: SystemTime,
    pub duration: Duration,
    pub cancelled: bool,
}

impl StreamResult {
    /// Fraction of chunks that succeeded; 0 when the stream was empty.
    pub fn success_rate(&self) -> f64 {
        if self.total_chunks == 0 {
            0.0
        } else {
            self.successful_chunks as f64 / self.total_chunks as f64
        }
    }
}

/// Progress snapshot passed to stream progress callbacks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub chunks_processed: usize,
    pub lines_processed: usize,
    pub failed_chunks: usize,
    pub elapsed: Duration,
}
