//! Insertion-ordered TTL cache with deterministic eviction.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{CacheBackend, CacheConfig, CacheStats, Clock, SystemClock};
use crate::telemetry;
use crate::types::TokenizationResult;

const BACKEND: &str = "ordered";

struct Entry {
    value: Arc<TokenizationResult>,
    /// `None` when `now + ttl` overflows; such entries never expire.
    expires_at: Option<Instant>,
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u64, Entry>,
    /// Insertion sequence → key. The first entry is the oldest.
    order: BTreeMap<u64, u64>,
    next_seq: u64,
}

impl Inner {
    fn remove(&mut self, key: u64) -> Option<Entry> {
        let entry = self.entries.remove(&key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            self.remove(*key);
        }
        expired.len()
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Bounded TTL cache that evicts expired entries first, then the oldest
/// insertion.
///
/// Re-setting an existing key counts as a fresh insertion. Entries expire
/// strictly after `inserted + ttl`, so a zero TTL still serves a `get` in
/// the same clock tick as its `set`.
///
/// ```rust
/// # use tokscope::cache::{CacheBackend, CacheConfig, ResultCache};
/// let cache = ResultCache::new(&CacheConfig::new().max_entries(2));
/// assert!(cache.get(1).is_none());
/// assert_eq!(cache.stats().misses, 1);
/// ```
pub struct ResultCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("max_entries", &self.max_entries)
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResultCache {
    /// Create a cache on the system clock without a background sweeper.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: config.max_entries,
            ttl: config.ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    /// Create a shared cache and start its background sweeper.
    pub fn start(config: &CacheConfig) -> Arc<Self> {
        let cache = Arc::new(Self::new(config));
        cache.spawn_sweeper(config.cleanup_interval);
        cache
    }

    /// Run the expiry sweep every `interval` on the current tokio runtime.
    ///
    /// The task holds only a weak reference, so it ends once the cache is
    /// dropped. Does nothing for a zero interval or outside a runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!("no tokio runtime, cache sweeper not started");
            return;
        };
        let weak = Arc::downgrade(self);
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    trace!(removed, "cache sweep");
                }
            }
        });
        if let Some(previous) = self.sweeper_slot().replace(task) {
            previous.abort();
        }
    }

    /// Drop every expired entry now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let removed = self.lock().purge_expired(now);
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a background sweeper task is attached.
    pub fn has_sweeper(&self) -> bool {
        self.sweeper_slot().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweeper_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheBackend for ResultCache {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn get_if(
        &self,
        key: u64,
        accept: &dyn Fn(&TokenizationResult) -> bool,
    ) -> Option<Arc<TokenizationResult>> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let expired = match inner.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => {
                if accept(&*entry.value) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&entry.value));
                }
                trace!(key, "cache key collision");
                false
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn set(&self, key: u64, value: Arc<TokenizationResult>) {
        if self.max_entries == 0 {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.remove(key).is_none() && inner.entries.len() >= self.max_entries {
            let purged = inner.purge_expired(now);
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
            let mut evicted = 0u64;
            while inner.entries.len() >= self.max_entries && inner.evict_oldest() {
                evicted += 1;
            }
            if evicted > 0 {
                self.evictions.fetch_add(evicted, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "backend" => BACKEND)
                    .increment(evicted);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key);
        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at: now.checked_add(self.ttl),
                seq,
            },
        );
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.lock().entries.len() as u64,
        }
    }

    fn close(&self) {
        if let Some(task) = self.sweeper_slot().take() {
            task.abort();
            debug!("cache sweeper stopped");
        }
    }
}

impl Drop for ResultCache {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper_slot().take() {
            task.abort();
        }
    }
}
