//! Bounded worker pool for batches of documents.
//!
//! Documents are split into batches and queued. Up to `max_workers` tokio
//! tasks drain the queue, each running one batch at a time through the
//! tokenizer sequentially. A semaphore owned by the executor caps active
//! batches across every run sharing it, so concurrent runs cannot
//! oversubscribe the tokenizer backend.
//!
//! Results carry no ordering guarantee between batches; each result names
//! its source document. Item failures are recorded and the run continues;
//! a panic while processing one document fails only that document. A
//! configured timeout aborts outstanding work and keeps what finished.
//! Documents in flight when it fires are recorded as timed out.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::engine::{self, AnalysisEngine};
use crate::error::{Result, TokscopeError, document_label};
use crate::telemetry;
use crate::tokenizer::Tokenizer;
use crate::types::{AnalysisResult, BatchResult, ItemError, ProcessingStats, TokenizationResult};

/// Upper bound on documents per batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Batches each worker should receive for load balancing (target 2–4).
const BATCHES_PER_WORKER: usize = 3;

/// Number of processors available to this process, at least 1.
pub fn available_processors() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Worker count heuristic: 75% of `processors`, at least 1.
pub fn optimal_worker_count(processors: usize) -> usize {
    (processors * 3 / 4).max(1)
}

/// Batch size giving each of `workers` roughly three batches of `items`,
/// clamped to `[1, MAX_BATCH_SIZE]`.
pub fn optimal_batch_size(items: usize, workers: usize) -> usize {
    let target_batches = workers.max(1) * BATCHES_PER_WORKER;
    items.div_ceil(target_batches).clamp(1, MAX_BATCH_SIZE)
}

/// Configuration for [`ParallelExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Concurrent worker cap. Default: [`optimal_worker_count`] of the
    /// available processors.
    pub max_workers: usize,
    /// Fixed batch size; `None` uses [`optimal_batch_size`].
    pub batch_size: Option<usize>,
    /// Wall-clock limit for a whole run. Default: none.
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: optimal_worker_count(available_processors()),
            batch_size: None,
            timeout: None,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n.clamp(1, MAX_BATCH_SIZE));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

type Batch = Vec<(usize, Arc<str>)>;
type ItemFn<T> = Arc<dyn Fn(Arc<str>) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Run-scoped state shared by the workers of one run.
struct RunState<T> {
    queue: Mutex<VecDeque<Batch>>,
    results: Mutex<Vec<T>>,
    errors: Mutex<Vec<ItemError>>,
    /// Documents a worker has started but not finished, by index.
    in_flight: Mutex<BTreeMap<usize, Arc<str>>>,
    processed: AtomicUsize,
    failed: AtomicUsize,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> RunState<T> {
    fn record_failure(&self, index: usize, document: &str, error: &TokscopeError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => "error").increment(1);
        lock(&self.errors).push(ItemError {
            index,
            document: document_label(document),
            message: error.to_string(),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}

/// Fans documents out over a bounded pool of tokio tasks.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    config: ExecutorConfig,
    engine: Arc<AnalysisEngine>,
    permits: Arc<Semaphore>,
}

impl ParallelExecutor {
    pub fn new(config: ExecutorConfig, engine: AnalysisEngine) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            engine: Arc::new(engine),
            permits,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Tokenize every document.
    #[instrument(skip_all, fields(tokenizer = tokenizer.name(), documents = documents.len()))]
    pub async fn tokenize_batch(
        &self,
        documents: &[String],
        tokenizer: Arc<dyn Tokenizer>,
        cancel: &CancelSignal,
    ) -> BatchResult<TokenizationResult> {
        let op: ItemFn<TokenizationResult> = Arc::new(move |document: Arc<str>| {
            let tokenizer = Arc::clone(&tokenizer);
            async move { engine::tokenize(&document, tokenizer.as_ref()).await }.boxed()
        });
        self.run(documents, op, cancel).await
    }

    /// Tokenize and analyze every document.
    #[instrument(skip_all, fields(tokenizer = tokenizer.name(), documents = documents.len()))]
    pub async fn analyze_batch(
        &self,
        documents: &[String],
        tokenizer: Arc<dyn Tokenizer>,
        cancel: &CancelSignal,
    ) -> BatchResult<AnalysisResult> {
        let engine = Arc::clone(&self.engine);
        let op: ItemFn<AnalysisResult> = Arc::new(move |document: Arc<str>| {
            let tokenizer = Arc::clone(&tokenizer);
            let engine = Arc::clone(&engine);
            async move { engine.analyze_document(&document, tokenizer.as_ref()).await }.boxed()
        });
        self.run(documents, op, cancel).await
    }

    async fn run<T: Send + 'static>(
        &self,
        documents: &[String],
        op: ItemFn<T>,
        cancel: &CancelSignal,
    ) -> BatchResult<T> {
        let total = documents.len();
        let mut stats = ProcessingStats::start(total);
        if total == 0 {
            stats.finish();
            return BatchResult {
                results: Vec::new(),
                errors: Vec::new(),
                stats,
            };
        }

        let batch_size = self
            .config
            .batch_size
            .unwrap_or_else(|| optimal_batch_size(total, self.config.max_workers));
        let queue = partition(documents, batch_size);
        let workers = self.config.max_workers.clamp(1, queue.len());
        stats.batch_size = batch_size;
        stats.batch_count = queue.len();
        stats.workers_used = workers;
        info!(total, workers, batch_size, batches = queue.len(), "batch run started");

        let state = Arc::new(RunState {
            queue: Mutex::new(queue),
            results: Mutex::new(Vec::with_capacity(total)),
            errors: Mutex::new(Vec::new()),
            in_flight: Mutex::new(BTreeMap::new()),
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });

        let mut set = JoinSet::new();
        for worker in 0..workers {
            set.spawn(work(
                worker,
                Arc::clone(&state),
                Arc::clone(&op),
                Arc::clone(&self.permits),
                cancel.clone(),
            ));
        }

        let drain = async {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "worker task failed");
                }
            }
        };
        let timed_out = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, drain).await.is_err(),
            None => {
                drain.await;
                false
            }
        };
        if timed_out {
            warn!(timeout = ?self.config.timeout, "batch run timed out, aborting workers");
            set.abort_all();
            while set.join_next().await.is_some() {}
        }

        // whatever is still in flight was cut off by the timeout or a dead worker
        let lost = std::mem::take(&mut *lock(&state.in_flight));
        for (index, document) in lost {
            let error = match self.config.timeout {
                Some(limit) if timed_out => TokscopeError::Timeout(limit),
                _ => TokscopeError::Join("worker exited mid-document".into()),
            };
            warn!(index, error = %error, "document lost");
            state.record_failure(index, &document, &error);
        }

        stats.processed_items = state.processed.load(Ordering::Relaxed);
        stats.failed_items = state.failed.load(Ordering::Relaxed);
        stats.timed_out = timed_out;
        stats.cancelled = cancel.is_cancelled();
        stats.finish();
        if stats.skipped_items > 0 {
            metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => "cancelled")
                .increment(stats.skipped_items as u64);
        }
        info!(
            processed = stats.processed_items,
            failed = stats.failed_items,
            skipped = stats.skipped_items,
            duration_ms = stats.duration.as_millis() as u64,
            "batch run finished"
        );

        let results = std::mem::take(&mut *lock(&state.results));
        let errors = std::mem::take(&mut *lock(&state.errors));
        BatchResult {
            results,
            errors,
            stats,
        }
    }
}

fn partition(documents: &[String], batch_size: usize) -> VecDeque<Batch> {
    let batch_size = batch_size.max(1);
    let mut queue = VecDeque::with_capacity(documents.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for (index, document) in documents.iter().enumerate() {
        current.push((index, Arc::from(document.as_str())));
        if current.len() == batch_size {
            queue.push_back(std::mem::replace(&mut current, Vec::with_capacity(batch_size)));
        }
    }
    if !current.is_empty() {
        queue.push_back(current);
    }
    queue
}

async fn work<T: Send + 'static>(
    worker: usize,
    state: Arc<RunState<T>>,
    op: ItemFn<T>,
    permits: Arc<Semaphore>,
    cancel: CancelSignal,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Ok(_permit) = permits.acquire().await else {
            break;
        };
        let Some(batch) = lock(&state.queue).pop_front() else {
            break;
        };
        debug!(worker, items = batch.len(), "batch started");
        for (index, document) in batch {
            if cancel.is_cancelled() {
                break;
            }
            lock(&state.in_flight).insert(index, Arc::clone(&document));
            let outcome = AssertUnwindSafe(op(Arc::clone(&document)))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TokscopeError::Join(panic_message(&*panic))));
            lock(&state.in_flight).remove(&index);
            match outcome {
                Ok(result) => {
                    state.processed.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => "ok").increment(1);
                    lock(&state.results).push(result);
                }
                Err(e) => {
                    warn!(worker, index, error = %e, "document failed");
                    state.record_failure(index, &document, &e);
                }
            }
        }
    }
}
