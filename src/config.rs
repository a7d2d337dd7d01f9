//! TOML configuration file.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (CLI `--config`)
//! 2. `~/.tokscope/config.toml` (user)
//! 3. `/etc/tokscope/config.toml` (system)
//!
//! Every section and key is optional; missing values take the component
//! defaults. The file is only an adapter onto the component config structs
//! ([`EngineConfig`], [`CacheConfig`], [`ExecutorConfig`], [`StreamConfig`],
//! [`ManagerConfig`]).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheBackendKind, CacheConfig};
use crate::engine::EngineConfig;
use crate::error::{Result, TokscopeError};
use crate::manager::{ExecutionMode, ManagerConfig};
use crate::parallel::ExecutorConfig;
use crate::streaming::StreamConfig;

/// Whole configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub parallel: ParallelSection,
    #[serde(default)]
    pub streaming: StreamingSection,
    #[serde(default)]
    pub manager: ManagerSection,
}

/// `[engine]`: calculator settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Rolling entropy window in tokens (default: 100).
    pub rolling_window: usize,
    /// Emit `entropy_normalized` (default: true).
    pub normalize_entropy: bool,
    /// Reuse top-K list length (default: 10).
    pub top_k: usize,
    /// Reuse repeat/burst analysis (default: true).
    pub pattern_analysis: bool,
    /// Charge token text bytes in the compression ratio (default: false).
    pub include_metadata: bool,
    /// Fixed bytes per token id (default: 4).
    pub bytes_per_token: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            rolling_window: engine.entropy.window_size,
            normalize_entropy: engine.entropy.normalize,
            top_k: engine.reuse.top_k,
            pattern_analysis: engine.reuse.pattern_analysis,
            include_metadata: engine.compression.include_metadata,
            bytes_per_token: engine.compression.bytes_per_token,
        }
    }
}

/// `[cache]`: tokenization result cache.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Wrap tokenizers in the cache (default: true).
    pub enabled: bool,
    /// "ordered" or "moka" (default: "ordered").
    pub backend: CacheBackendKind,
    /// Maximum entries (default: 10000).
    pub max_entries: usize,
    /// Entry time-to-live in seconds (default: 3600).
    pub ttl_secs: u64,
    /// Background sweep period in seconds, 0 disables (default: 60).
    pub cleanup_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            enabled: true,
            backend: cache.backend,
            max_entries: cache.max_entries,
            ttl_secs: cache.ttl.as_secs(),
            cleanup_interval_secs: cache.cleanup_interval.as_secs(),
        }
    }
}

/// `[parallel]`: batch executor.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ParallelSection {
    /// Worker cap (default: 75% of available processors).
    pub max_workers: Option<usize>,
    /// Documents per batch (default: sized for 2–4 batches per worker).
    pub batch_size: Option<usize>,
    /// Whole-run timeout in seconds (default: none).
    pub timeout_secs: Option<u64>,
}

/// `[streaming]`: chunked stream analysis.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingSection {
    /// Lines per chunk (default: 1000).
    pub chunk_size: usize,
    /// Chunks between progress updates, 0 disables (default: 10).
    pub progress_interval: usize,
    /// Keep per-chunk metrics in results (default: true).
    pub retain_chunk_results: bool,
}

impl Default for StreamingSection {
    fn default() -> Self {
        let stream = StreamConfig::default();
        Self {
            chunk_size: stream.chunk_size,
            progress_interval: stream.progress_interval,
            retain_chunk_results: stream.retain_chunk_results,
        }
    }
}

/// `[manager]`: execution mode policy and plugins.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerSection {
    /// Document count from which batches run in parallel (default: 8).
    pub parallel_threshold: usize,
    /// Input size in bytes from which input is streamed (default: 50 MiB).
    pub streaming_threshold_bytes: u64,
    /// Force one execution mode instead of choosing by size.
    pub mode: Option<ExecutionMode>,
    /// Compiled-in plugins to apply, by name (default: none).
    pub plugins: Vec<String>,
}

impl Default for ManagerSection {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            parallel_threshold: manager.parallel_threshold,
            streaming_threshold_bytes: manager.streaming_threshold_bytes,
            mode: manager.forced_mode,
            plugins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.tokscope/config.toml`
    /// 3. `/etc/tokscope/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?.ok_or_else(|| {
            TokscopeError::Configuration(
                "No config file found. Create ~/.tokscope/config.toml or /etc/tokscope/config.toml"
                    .to_string(),
            )
        })?;
        Self::load_from_file(&path)
    }

    /// Like [`Config::load`], but fall back to defaults when no file exists
    /// in the standard locations. An explicit path must still exist.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TokscopeError::Configuration(format!("Failed to parse config: {e}")))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TokscopeError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            TokscopeError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path; `None` when no standard file exists.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(TokscopeError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tokscope").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/tokscope/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
        Ok(None)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let e = &self.engine;
        EngineConfig::new()
            .rolling_window(e.rolling_window)
            .normalize_entropy(e.normalize_entropy)
            .top_k(e.top_k)
            .pattern_analysis(e.pattern_analysis)
            .include_metadata(e.include_metadata)
            .bytes_per_token(e.bytes_per_token)
    }

    /// Cache settings, or `None` when caching is disabled.
    pub fn cache_config(&self) -> Option<CacheConfig> {
        let c = &self.cache;
        c.enabled.then(|| {
            CacheConfig::new()
                .backend(c.backend)
                .max_entries(c.max_entries)
                .ttl(Duration::from_secs(c.ttl_secs))
                .cleanup_interval(Duration::from_secs(c.cleanup_interval_secs))
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let p = &self.parallel;
        let mut config = ExecutorConfig::new();
        if let Some(workers) = p.max_workers {
            config = config.max_workers(workers);
        }
        if let Some(size) = p.batch_size {
            config = config.batch_size(size);
        }
        if let Some(secs) = p.timeout_secs {
            config = config.timeout(Duration::from_secs(secs));
        }
        config
    }

    pub fn stream_config(&self) -> StreamConfig {
        let s = &self.streaming;
        StreamConfig::new()
            .chunk_size(s.chunk_size)
            .progress_interval(s.progress_interval)
            .retain_chunk_results(s.retain_chunk_results)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        let m = &self.manager;
        ManagerConfig {
            parallel_threshold: m.parallel_threshold,
            streaming_threshold_bytes: m.streaming_threshold_bytes,
            forced_mode: m.mode,
        }
    }
}
