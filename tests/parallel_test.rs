//! Tests for [`ParallelExecutor`]: equivalence with sequential runs,
//! failure accounting, cancellation and timeouts.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{CountingTokenizer, FailingTokenizer, SlowTokenizer, corpus, split_words};
use tokscope::{
    AnalysisEngine, CancelSignal, ExecutorConfig, ParallelExecutor, Result, TokenizationResult,
    Tokenizer, WhitespaceTokenizer,
};

fn executor(workers: usize, batch: usize) -> ParallelExecutor {
    ParallelExecutor::new(
        ExecutorConfig::new().max_workers(workers).batch_size(batch),
        AnalysisEngine::default(),
    )
}

/// Cancels the shared signal on its `after`-th call.
struct CancellingTokenizer {
    cancel: CancelSignal,
    after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Tokenizer for CancellingTokenizer {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.after {
            self.cancel.cancel();
        }
        Ok(split_words(document, "cancelling"))
    }
}

// =========================================================================
// Equivalence
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_matches_sequential_per_document() {
    let docs = corpus(40);
    let engine = AnalysisEngine::default();
    let sequential = engine
        .analyze_batch(&docs, &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    let parallel = executor(4, 3)
        .analyze_batch(&docs, Arc::new(WhitespaceTokenizer::new()), &CancelSignal::new())
        .await;

    assert_eq!(parallel.results.len(), docs.len());
    assert!(parallel.stats.all_succeeded());
    assert_eq!(parallel.stats.batch_count, 14);
    assert_eq!(parallel.stats.workers_used, 4);

    // order is not guaranteed; match by document
    let by_doc: BTreeMap<&str, _> = parallel
        .results
        .iter()
        .map(|r| (r.document.as_str(), r))
        .collect();
    for expected in &sequential.results {
        let got = by_doc[expected.document.as_str()];
        assert_eq!(got.metric_values(), expected.metric_values());
    }
}

#[tokio::test]
async fn tokenize_batch_returns_every_tokenization() {
    let docs = corpus(10);
    let tokenizer = Arc::new(CountingTokenizer::new("counting"));
    let batch = executor(3, 2)
        .tokenize_batch(&docs, tokenizer.clone(), &CancelSignal::new())
        .await;
    assert_eq!(batch.results.len(), 10);
    assert_eq!(tokenizer.calls(), 10);
    assert!(batch.results.iter().all(|t| t.tokenizer_name == "counting"));
}

#[tokio::test]
async fn workers_never_exceed_batches() {
    let batch = executor(16, 5)
        .analyze_batch(&corpus(10), Arc::new(WhitespaceTokenizer::new()), &CancelSignal::new())
        .await;
    assert_eq!(batch.stats.batch_count, 2);
    assert_eq!(batch.stats.workers_used, 2);
}

#[tokio::test]
async fn empty_input_is_a_successful_noop() {
    let batch = executor(4, 10)
        .analyze_batch(&[], Arc::new(WhitespaceTokenizer::new()), &CancelSignal::new())
        .await;
    assert!(batch.results.is_empty());
    assert_eq!(batch.stats.total_items, 0);
    assert!(batch.stats.all_succeeded());
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn failures_are_recorded_and_run_continues() {
    let mut docs = corpus(9);
    docs[2] = "poison a".into();
    docs[7] = "poison b".into();
    let batch = executor(2, 2)
        .analyze_batch(&docs, Arc::new(FailingTokenizer), &CancelSignal::new())
        .await;

    assert_eq!(batch.stats.processed_items, 7);
    assert_eq!(batch.stats.failed_items, 2);
    assert_eq!(batch.stats.skipped_items, 0);
    let mut failed: Vec<usize> = batch.errors.iter().map(|e| e.index).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec![2, 7]);
    assert!(batch.errors.iter().all(|e| e.message.contains("failing")));
    assert!((batch.stats.success_rate() - 7.0 / 9.0).abs() < 1e-12);
}

// =========================================================================
// Cancellation and timeout
// =========================================================================

#[tokio::test]
async fn cancellation_finishes_in_flight_item_and_skips_rest() {
    let cancel = CancelSignal::new();
    let tokenizer = Arc::new(CancellingTokenizer {
        cancel: cancel.clone(),
        after: 3,
        calls: AtomicUsize::new(0),
    });
    let batch = executor(1, 2)
        .analyze_batch(&corpus(10), tokenizer.clone(), &cancel)
        .await;

    assert!(batch.stats.cancelled);
    assert_eq!(batch.stats.processed_items, 3);
    assert_eq!(batch.results.len(), 3);
    assert_eq!(batch.stats.skipped_items, 7);
    assert_eq!(tokenizer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn pre_cancelled_run_processes_nothing() {
    let cancel = CancelSignal::new();
    cancel.cancel();
    let tokenizer = Arc::new(CountingTokenizer::new("counting"));
    let batch = executor(4, 1)
        .analyze_batch(&corpus(6), tokenizer.clone(), &cancel)
        .await;
    assert!(batch.stats.cancelled);
    assert_eq!(batch.stats.skipped_items, 6);
    assert_eq!(tokenizer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_finished_work() {
    let executor = ParallelExecutor::new(
        ExecutorConfig::new()
            .max_workers(2)
            .batch_size(1)
            .timeout(Duration::from_millis(250)),
        AnalysisEngine::default(),
    );
    let tokenizer = Arc::new(SlowTokenizer {
        delay: Duration::from_millis(100),
    });
    let batch = executor
        .analyze_batch(&corpus(10), tokenizer, &CancelSignal::new())
        .await;

    assert!(batch.stats.timed_out);
    assert!(!batch.stats.cancelled);
    // two rounds finish at 100ms and 200ms; the third is cut off at 250ms
    assert_eq!(batch.stats.processed_items, 4);
    assert_eq!(batch.results.len(), batch.stats.processed_items);
    assert_eq!(batch.stats.failed_items, 2);
    assert_eq!(batch.errors.len(), 2);
    assert!(
        batch.errors.iter().all(|e| e.message.contains("timed out after 250ms")),
        "{:?}",
        batch.errors
    );
    assert_eq!(batch.stats.skipped_items, 4);
    assert_eq!(
        batch.stats.processed_items + batch.stats.failed_items + batch.stats.skipped_items,
        batch.stats.total_items
    );
}

/// Panics on any document containing `explode`.
struct PanickingTokenizer;

#[async_trait]
impl Tokenizer for PanickingTokenizer {
    fn name(&self) -> &str {
        "panicking"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        if document.contains("explode") {
            panic!("tokenizer backend crashed");
        }
        Ok(split_words(document, "panicking"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_document_fails_alone() {
    let mut docs = corpus(9);
    docs[4] = "please explode now".to_string();
    let batch = executor(2, 3)
        .analyze_batch(&docs, Arc::new(PanickingTokenizer), &CancelSignal::new())
        .await;

    assert_eq!(batch.stats.processed_items, 8);
    assert_eq!(batch.stats.failed_items, 1);
    assert_eq!(batch.stats.skipped_items, 0);
    assert_eq!(batch.errors.len(), 1);
    let error = &batch.errors[0];
    assert_eq!(error.index, 4);
    assert!(error.message.contains("worker task failed"), "{}", error.message);
    assert!(error.message.contains("tokenizer backend crashed"), "{}", error.message);
}

#[tokio::test]
async fn executors_sharing_permits_share_the_cap() {
    // clones share one semaphore
    let executor = executor(2, 1);
    let other = executor.clone();
    let docs = corpus(6);
    let cancel_a = CancelSignal::new();
    let cancel_b = CancelSignal::new();
    let (a, b) = tokio::join!(
        executor.analyze_batch(&docs, Arc::new(WhitespaceTokenizer::new()), &cancel_a),
        other.analyze_batch(&docs, Arc::new(WhitespaceTokenizer::new()), &cancel_b),
    );
    assert!(a.stats.all_succeeded());
    assert!(b.stats.all_succeeded());
    assert_eq!(a.results.len() + b.results.len(), 12);
}
