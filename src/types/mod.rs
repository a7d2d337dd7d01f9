//! Public data model for tokscope.

mod analysis;
mod run;
mod token;
mod tokenization;

use std::collections::BTreeMap;

/// Free-form metadata attached to tokens, results and metrics.
pub type Metadata = BTreeMap<String, serde_json::Value>;

pub use analysis::{AnalysisResult, MetricResult};
pub use run::{
    BatchResult, ChunkError, ChunkResult, ItemError, ProcessingStats, ProgressUpdate, StreamResult,
};
pub use token::Token;
pub use tokenization::{TokenizationResult, VOCAB_SIZE_KEY};
