//! Content-addressed result cache.
//!
//! The cache sits in front of a tokenizer (see
//! [`CachedTokenizer`](crate::tokenizer::CachedTokenizer)), not the engine:
//! repeated `(tokenizer, document)` inputs skip the backend call entirely
//! while calculators still run. Keys are a content hash of the tokenizer
//! name and the document text; values are shared [`TokenizationResult`]s.
//!
//! Two interchangeable backends implement [`CacheBackend`]:
//!
//! - [`ResultCache`]: insertion-ordered eviction with an injectable
//!   [`Clock`] and a background expiry sweeper. Deterministic under a fixed
//!   insertion order, which is what tests rely on.
//! - [`MokaCache`]: moka's concurrent LRU + TTL cache for high-throughput
//!   runs where exact eviction order does not matter.
//!
//! All backends are safe to share between executor workers; every mutation
//! goes through `get`/`set`.

mod clock;
mod moka_backend;
mod ordered;

pub use clock::{Clock, ManualClock, SystemClock};
pub use moka_backend::MokaCache;
pub use ordered::ResultCache;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::TokenizationResult;

/// Which [`CacheBackend`] implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// [`ResultCache`]: oldest-insertion eviction, deterministic.
    #[default]
    Ordered,
    /// [`MokaCache`]: moka LRU/TinyLFU.
    Moka,
}

/// Configuration for the result cache.
///
/// ```rust
/// # use tokscope::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
    /// Period of the background expiry sweep. Zero disables it. Default: 60s.
    pub cleanup_interval: Duration,
    /// Backend implementation. Default: [`CacheBackendKind::Ordered`].
    pub backend: CacheBackendKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(60),
            backend: CacheBackendKind::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the background sweep period.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Choose the backend implementation.
    pub fn backend(mut self, backend: CacheBackendKind) -> Self {
        self.backend = backend;
        self
    }
}

/// Counters exposed for operational observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for new ones.
    pub evictions: u64,
    /// Entries removed because their TTL passed.
    pub expirations: u64,
    /// Current number of entries.
    pub size: u64,
}

impl CacheStats {
    /// Hits over lookups; 0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Storage behind [`CachedTokenizer`](crate::tokenizer::CachedTokenizer).
///
/// Operations are synchronous and short: implementations hold a lock only
/// for map updates, never across a tokenizer call.
pub trait CacheBackend: Send + Sync {
    /// Backend label for logs and metrics.
    fn backend_name(&self) -> &'static str;

    /// Look up a live entry. Counts a hit or a miss.
    fn get(&self, key: u64) -> Option<Arc<TokenizationResult>> {
        self.get_if(key, &|_| true)
    }

    /// Look up a live entry that `accept` confirms belongs to the request.
    ///
    /// An entry `accept` rejects (a key collision) counts as a miss and is
    /// left in place for the following `set` to overwrite.
    fn get_if(
        &self,
        key: u64,
        accept: &dyn Fn(&TokenizationResult) -> bool,
    ) -> Option<Arc<TokenizationResult>>;

    /// Insert or overwrite an entry, evicting if the cache is full.
    fn set(&self, key: u64, value: Arc<TokenizationResult>);

    fn stats(&self) -> CacheStats;

    /// Stop background maintenance. The cache stays usable afterwards.
    fn close(&self);
}

/// Compute a cache key from tokenizer identity and document text.
///
/// Uses `DefaultHasher` (SipHash), deterministic within a process
/// lifetime, which is sufficient for an in-memory cache.
pub fn cache_key(tokenizer: &str, document: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    tokenizer.hash(&mut hasher);
    document.hash(&mut hasher);
    hasher.finish()
}

/// Build the backend selected by `config`.
///
/// The ordered backend starts its sweeper when called inside a tokio
/// runtime; outside one, expired entries are still dropped lazily.
pub fn build_backend(config: &CacheConfig) -> Arc<dyn CacheBackend> {
    match config.backend {
        CacheBackendKind::Ordered => ResultCache::start(config),
        CacheBackendKind::Moka => Arc::new(MokaCache::new(config)),
    }
}
