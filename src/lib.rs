//! Tokscope - statistical fingerprints of tokenized text
//!
//! This crate computes entropy, compression, reuse and cross-tokenizer
//! drift metrics for tokenizer output, and scales that computation to large
//! corpora with a tokenization cache, a bounded worker pool and a
//! memory-bounded streaming analyzer.
//!
//! Tokenizers are external collaborators behind the [`Tokenizer`] trait;
//! the built-in [`WhitespaceTokenizer`] and [`CharacterTokenizer`] exist for
//! testing and smoke runs, and `HfTokenizer` (feature `huggingface`) wraps
//! HuggingFace tokenizers.
//!
//! # Single document
//!
//! ```rust
//! use tokscope::{AnalysisEngine, WhitespaceTokenizer};
//!
//! # tokio_test::block_on(async {
//! let engine = AnalysisEngine::default();
//! let result = engine
//!     .analyze_document("the cat sat on the mat", &WhitespaceTokenizer::new())
//!     .await?;
//!
//! let reuse = result.metric("reuse_ratio").unwrap();
//! assert!((reuse - 1.0 / 6.0).abs() < 1e-9);
//! # Ok::<(), tokscope::TokscopeError>(())
//! # }).unwrap();
//! ```
//!
//! # Corpus scale
//!
//! ```rust,no_run
//! use tokscope::{AdvancedManager, CacheConfig, CancelSignal, TokenizerRegistry};
//!
//! #[tokio::main]
//! async fn main() -> tokscope::Result<()> {
//!     let manager = AdvancedManager::builder()
//!         .registry(TokenizerRegistry::with_builtins())
//!         .cache(CacheConfig::default())
//!         .build()?;
//!
//!     let run = manager
//!         .analyze_file("corpus.txt".as_ref(), "whitespace", &CancelSignal::new())
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&run)?);
//!     manager.close();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod calculators;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod manager;
pub mod parallel;
pub mod plugin;
pub mod streaming;
pub mod telemetry;
pub mod tokenizer;
pub mod types;

// Re-export main types at crate root
pub use error::{Result, TokscopeError};

pub use cache::{CacheBackend, CacheConfig, CacheStats, MokaCache, ResultCache};
pub use cancel::CancelSignal;
pub use config::Config;
pub use engine::{AnalysisEngine, EngineConfig, TokenizerComparison};
pub use manager::{AdvancedManager, AdvancedManagerBuilder, ExecutionMode, ManagedRun, ManagerConfig};
pub use parallel::{ExecutorConfig, ParallelExecutor};
pub use plugin::{MetricPlugin, PluginContext, PluginRegistry};
pub use streaming::{ProgressCallback, StreamConfig, StreamingAnalyzer};
pub use tokenizer::{CachedTokenizer, CharacterTokenizer, Tokenizer, TokenizerRegistry, WhitespaceTokenizer};

#[cfg(feature = "huggingface")]
pub use tokenizer::HfTokenizer;

// Re-export all types
pub use types::{
    AnalysisResult, BatchResult, ChunkError, ChunkResult, ItemError, MetricResult,
    ProcessingStats, ProgressUpdate, StreamResult, Token, TokenizationResult,
};
