//! moka-backed cache backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::notification::RemovalCause;
use moka::sync::Cache;

use super::{CacheBackend, CacheConfig, CacheStats};
use crate::telemetry;
use crate::types::TokenizationResult;

const BACKEND: &str = "moka";

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// TTL cache over `moka::sync::Cache` (TinyLFU admission, LRU eviction).
///
/// Faster under contention than [`ResultCache`](super::ResultCache), but
/// eviction order and expiry timing are moka's and not deterministic.
/// A zero `max_entries` disables storage.
pub struct MokaCache {
    cache: Cache<u64, Arc<TokenizationResult>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for MokaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MokaCache {
    pub fn new(config: &CacheConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let listener = Arc::clone(&counters);
        let cache = Cache::builder()
            .max_capacity(config.max_entries as u64)
            .time_to_live(config.ttl)
            .eviction_listener(move |_key, _value, cause| match cause {
                RemovalCause::Size => {
                    listener.evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "backend" => BACKEND)
                        .increment(1);
                }
                RemovalCause::Expired => {
                    listener.expirations.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            })
            .build();
        Self { cache, counters }
    }
}

impl CacheBackend for MokaCache {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn get_if(
        &self,
        key: u64,
        accept: &dyn Fn(&TokenizationResult) -> bool,
    ) -> Option<Arc<TokenizationResult>> {
        let found = self.cache.get(&key).filter(|value| accept(value.as_ref()));
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn set(&self, key: u64, value: Arc<TokenizationResult>) {
        self.cache.insert(key, value);
    }

    fn stats(&self) -> CacheStats {
        // entry_count lags until pending maintenance has run
        self.cache.run_pending_tasks();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            size: self.cache.entry_count(),
        }
    }

    fn close(&self) {
        self.cache.run_pending_tasks();
    }
}
