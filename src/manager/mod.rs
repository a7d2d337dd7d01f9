//! Execution policy layer over engine, executor and streaming analyzer.
//!
//! The [`AdvancedManager`] owns the tokenizer registry (optionally wrapped
//! in the result cache), picks an [`ExecutionMode`] from input size, and
//! merges plugin metrics into every result.
//!
//! # Example
//!
//! ```rust,no_run
//! use tokscope::{AdvancedManager, CancelSignal, TokenizerRegistry};
//!
//! #[tokio::main]
//! async fn main() -> tokscope::Result<()> {
//!     let manager = AdvancedManager::builder()
//!         .registry(TokenizerRegistry::with_builtins())
//!         .plugins(&["fertility"])
//!         .build()?;
//!
//!     let docs = vec!["the cat sat on the mat".to_string()];
//!     let run = manager
//!         .analyze_documents(&docs, "whitespace", &CancelSignal::new())
//!         .await?;
//!     println!("{:?} mode", run.mode());
//!     manager.close();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument};

use crate::cache::{CacheBackend, CacheConfig, CacheStats, build_backend};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::engine::{AnalysisEngine, EngineConfig, TokenizerComparison};
use crate::error::{Result, TokscopeError};
use crate::parallel::{ExecutorConfig, ParallelExecutor};
use crate::plugin::{MetricPlugin, PluginRegistry};
use crate::streaming::{StreamConfig, StreamingAnalyzer};
use crate::tokenizer::{CachedTokenizer, Tokenizer, TokenizerRegistry};
use crate::types::{AnalysisResult, BatchResult, ProgressUpdate, StreamResult};

/// Default document count from which batches run in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 8;

/// Default input size from which input is streamed (50 MiB).
pub const DEFAULT_STREAMING_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// How a run is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Sequential, one document after another.
    Standard,
    /// Worker pool over batches.
    Parallel,
    /// Line chunks from a byte stream, bounded memory.
    Streaming,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Standard => "standard",
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Streaming => "streaming",
        })
    }
}

/// Mode selection thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Document count from which [`ExecutionMode::Parallel`] is used.
    pub parallel_threshold: usize,
    /// Total input bytes from which [`ExecutionMode::Streaming`] is used.
    pub streaming_threshold_bytes: u64,
    /// Skip selection and always use this mode.
    pub forced_mode: Option<ExecutionMode>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            streaming_threshold_bytes: DEFAULT_STREAMING_THRESHOLD_BYTES,
            forced_mode: None,
        }
    }
}

/// Outcome of a managed run, tagged with the mode that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ManagedRun {
    Standard(BatchResult<AnalysisResult>),
    Parallel(BatchResult<AnalysisResult>),
    Streaming(StreamResult),
}

impl ManagedRun {
    pub fn mode(&self) -> ExecutionMode {
        match self {
            ManagedRun::Standard(_) => ExecutionMode::Standard,
            ManagedRun::Parallel(_) => ExecutionMode::Parallel,
            ManagedRun::Streaming(_) => ExecutionMode::Streaming,
        }
    }

    /// The batch outcome, for standard and parallel runs.
    pub fn batch(&self) -> Option<&BatchResult<AnalysisResult>> {
        match self {
            ManagedRun::Standard(b) | ManagedRun::Parallel(b) => Some(b),
            ManagedRun::Streaming(_) => None,
        }
    }

    /// The stream outcome, for streaming runs.
    pub fn stream(&self) -> Option<&StreamResult> {
        match self {
            ManagedRun::Streaming(s) => Some(s),
            _ => None,
        }
    }
}

/// Entry point tying the analysis components together.
pub struct AdvancedManager {
    config: ManagerConfig,
    registry: TokenizerRegistry,
    engine: AnalysisEngine,
    executor: ParallelExecutor,
    streaming: StreamingAnalyzer,
    plugins: PluginRegistry,
    cache: Option<Arc<dyn CacheBackend>>,
}

impl fmt::Debug for AdvancedManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvancedManager")
            .field("config", &self.config)
            .field("tokenizers", &self.registry.names())
            .field("plugins", &self.plugins)
            .field("cache", &self.cache.as_ref().map(|c| c.backend_name()))
            .finish()
    }
}

impl AdvancedManager {
    pub fn builder() -> AdvancedManagerBuilder {
        AdvancedManagerBuilder::new()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn tokenizer_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Look up a registered (possibly cache-wrapped) tokenizer.
    pub fn tokenizer(&self, name: &str) -> Result<Arc<dyn Tokenizer>> {
        self.registry.get(name)
    }

    /// Choose a mode for `doc_count` documents totalling `total_bytes`.
    ///
    /// Size wins over count: input at or above the streaming threshold is
    /// streamed regardless of how many documents it holds.
    pub fn select_mode(&self, doc_count: usize, total_bytes: u64) -> ExecutionMode {
        if let Some(mode) = self.config.forced_mode {
            return mode;
        }
        if total_bytes >= self.config.streaming_threshold_bytes {
            ExecutionMode::Streaming
        } else if doc_count >= self.config.parallel_threshold {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Standard
        }
    }

    /// Analyze in-memory documents with the named tokenizer.
    ///
    /// In streaming mode the documents are fed to the streaming analyzer as
    /// newline-separated lines, so results are per chunk, not per document.
    #[instrument(skip(self, documents, cancel), fields(documents = documents.len()))]
    pub async fn analyze_documents(
        &self,
        documents: &[String],
        tokenizer: &str,
        cancel: &CancelSignal,
    ) -> Result<ManagedRun> {
        let tokenizer = self.registry.get(tokenizer)?;
        let total_bytes: u64 = documents.iter().map(|d| d.len() as u64).sum();
        let mode = self.select_mode(documents.len(), total_bytes);
        info!(%mode, total_bytes, "analyzing documents");

        let run = match mode {
            ExecutionMode::Standard => ManagedRun::Standard(self.apply_plugins(
                self.engine
                    .analyze_batch(documents, tokenizer.as_ref(), cancel)
                    .await,
            )),
            ExecutionMode::Parallel => ManagedRun::Parallel(self.apply_plugins(
                self.executor
                    .analyze_batch(documents, Arc::clone(&tokenizer), cancel)
                    .await,
            )),
            ExecutionMode::Streaming => {
                let joined = documents.join("\n");
                ManagedRun::Streaming(
                    self.streaming
                        .analyze_reader(joined.as_bytes(), tokenizer.as_ref(), cancel)
                        .await,
                )
            }
        };
        Ok(run)
    }

    /// Stream `reader` through the named tokenizer.
    pub async fn analyze_reader<R>(
        &self,
        reader: R,
        tokenizer: &str,
        cancel: &CancelSignal,
    ) -> Result<StreamResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let tokenizer = self.registry.get(tokenizer)?;
        Ok(self
            .streaming
            .analyze_reader(reader, tokenizer.as_ref(), cancel)
            .await)
    }

    /// Analyze a file, streaming it when it reaches the streaming threshold.
    ///
    /// Smaller files are read whole (lossy UTF-8) and analyzed as a single
    /// document in standard mode.
    #[instrument(skip(self, path, cancel), fields(path = %path.display()))]
    pub async fn analyze_file(
        &self,
        path: &Path,
        tokenizer: &str,
        cancel: &CancelSignal,
    ) -> Result<ManagedRun> {
        let tokenizer = self.registry.get(tokenizer)?;
        let size = tokio::fs::metadata(path).await?.len();
        let mode = match self.select_mode(1, size) {
            ExecutionMode::Streaming => ExecutionMode::Streaming,
            _ => ExecutionMode::Standard,
        };
        debug!(size, %mode, "file mode selected");

        if mode == ExecutionMode::Streaming {
            let file = tokio::fs::File::open(path).await?;
            return Ok(ManagedRun::Streaming(
                self.streaming
                    .analyze_reader(file, tokenizer.as_ref(), cancel)
                    .await,
            ));
        }
        let bytes = tokio::fs::read(path).await?;
        let document = String::from_utf8_lossy(&bytes).into_owned();
        let batch = self
            .engine
            .analyze_batch(std::slice::from_ref(&document), tokenizer.as_ref(), cancel)
            .await;
        Ok(ManagedRun::Standard(self.apply_plugins(batch)))
    }

    /// Analyze `document` with each named tokenizer and compute pairwise
    /// drift. Plugin metrics are merged into every per-tokenizer result.
    pub async fn compare_tokenizers(
        &self,
        document: &str,
        tokenizers: &[&str],
    ) -> Result<TokenizerComparison> {
        let resolved = tokenizers
            .iter()
            .map(|name| self.registry.get(name))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&dyn Tokenizer> = resolved.iter().map(|t| t.as_ref()).collect();
        let mut comparison = self.engine.compare_tokenizers(document, &refs).await?;
        comparison.results = comparison
            .results
            .into_iter()
            .map(|(name, result)| (name, self.plugins.apply(result)))
            .collect();
        Ok(comparison)
    }

    /// Cache counters, when caching is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Stop background work. The manager remains usable.
    pub fn close(&self) {
        if let Some(cache) = &self.cache {
            cache.close();
        }
    }

    fn apply_plugins(&self, mut batch: BatchResult<AnalysisResult>) -> BatchResult<AnalysisResult> {
        if !self.plugins.is_empty() {
            batch.results = batch
                .results
                .into_iter()
                .map(|r| self.plugins.apply(r))
                .collect();
        }
        batch
    }
}

/// Builder for [`AdvancedManager`].
pub struct AdvancedManagerBuilder {
    registry: TokenizerRegistry,
    engine: EngineConfig,
    executor: ExecutorConfig,
    stream: StreamConfig,
    manager: ManagerConfig,
    cache: Option<CacheConfig>,
    plugin_names: Vec<String>,
    custom_plugins: Vec<Arc<dyn MetricPlugin>>,
    progress: Option<Arc<dyn Fn(ProgressUpdate) + Send + Sync>>,
}

impl Default for AdvancedManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvancedManagerBuilder {
    pub fn new() -> Self {
        Self {
            registry: TokenizerRegistry::new(),
            engine: EngineConfig::default(),
            executor: ExecutorConfig::default(),
            stream: StreamConfig::default(),
            manager: ManagerConfig::default(),
            cache: None,
            plugin_names: Vec::new(),
            custom_plugins: Vec::new(),
            progress: None,
        }
    }

    /// Apply every section of a configuration file.
    pub fn config(mut self, config: &Config) -> Self {
        self.engine = config.engine_config();
        self.executor = config.executor_config();
        self.stream = config.stream_config();
        self.manager = config.manager_config();
        self.cache = config.cache_config();
        self.plugin_names = config.manager.plugins.clone();
        self
    }

    pub fn registry(mut self, registry: TokenizerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register one more tokenizer.
    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.registry.register(tokenizer);
        self
    }

    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = config;
        self
    }

    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    pub fn stream_config(mut self, config: StreamConfig) -> Self {
        self.stream = config;
        self
    }

    pub fn manager_config(mut self, config: ManagerConfig) -> Self {
        self.manager = config;
        self
    }

    /// Force one execution mode.
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.manager.forced_mode = Some(mode);
        self
    }

    /// Enable the tokenization cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Select compiled-in plugins by name. Unknown names fail `build`.
    pub fn plugins<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.plugin_names = names.iter().map(|n| n.as_ref().to_string()).collect();
        self
    }

    /// Add a custom plugin.
    pub fn plugin(mut self, plugin: Arc<dyn MetricPlugin>) -> Self {
        self.custom_plugins.push(plugin);
        self
    }

    /// Progress callback for streaming runs.
    pub fn on_progress(mut self, callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Result<AdvancedManager> {
        if self.registry.is_empty() {
            return Err(TokscopeError::Configuration(
                "no tokenizers registered".to_string(),
            ));
        }

        let mut plugins = PluginRegistry::from_names(&self.plugin_names)?;
        for plugin in self.custom_plugins {
            plugins.register(plugin);
        }

        let cache = self.cache.as_ref().map(build_backend);
        let registry = match &cache {
            Some(backend) => self.registry.map(|inner| {
                Arc::new(CachedTokenizer::new(inner, Arc::clone(backend))) as Arc<dyn Tokenizer>
            }),
            None => self.registry,
        };

        let engine = AnalysisEngine::new(self.engine);
        let executor = ParallelExecutor::new(self.executor, engine.clone());
        let mut streaming =
            StreamingAnalyzer::new(self.stream, engine.clone()).with_plugins(plugins.clone());
        if let Some(callback) = self.progress {
            streaming = streaming.on_progress(move |update| callback(update));
        }

        info!(
            tokenizers = registry.len(),
            plugins = plugins.len(),
            cache = cache.as_ref().map(|c| c.backend_name()),
            "manager ready"
        );
        Ok(AdvancedManager {
            config: self.manager,
            registry,
            engine,
            executor,
            streaming,
            plugins,
            cache,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AdvancedManager {
        AdvancedManager::builder()
            .registry(TokenizerRegistry::with_builtins())
            .build()
            .unwrap()
    }

    #[test]
    fn select_mode_by_size_then_count() {
        let m = manager();
        assert_eq!(m.select_mode(1, 10), ExecutionMode::Standard);
        assert_eq!(m.select_mode(8, 10), ExecutionMode::Parallel);
        assert_eq!(
            m.select_mode(1, DEFAULT_STREAMING_THRESHOLD_BYTES),
            ExecutionMode::Streaming
        );
    }

    #[test]
    fn forced_mode_wins() {
        let m = AdvancedManager::builder()
            .registry(TokenizerRegistry::with_builtins())
            .mode(ExecutionMode::Parallel)
            .build()
            .unwrap();
        assert_eq!(m.select_mode(1, 1), ExecutionMode::Parallel);
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert!(matches!(
            AdvancedManager::builder().build(),
            Err(TokscopeError::Configuration(_))
        ));
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        let err = AdvancedManager::builder()
            .registry(TokenizerRegistry::with_builtins())
            .plugins(&["nope"])
            .build()
            .unwrap_err();
        assert!(matches!(err, TokscopeError::Configuration(_)));
    }

    #[test]
    fn mode_display_matches_serde() {
        assert_eq!(ExecutionMode::Streaming.to_string(), "streaming");
        assert_eq!(
            serde_json::to_string(&ExecutionMode::Parallel).unwrap(),
            "\"parallel\""
        );
    }
}
