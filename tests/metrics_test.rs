//! Tests for metrics emission.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. Only code paths that
//! record on the calling thread are exercised here; the local recorder does
//! not follow spawned tasks.

mod common;

use std::sync::Arc;

use common::{CountingTokenizer, FailingTokenizer};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use tokscope::cache::CacheBackend;
use tokscope::{
    AnalysisEngine, AnalysisResult, CacheConfig, CachedTokenizer, CancelSignal, MetricPlugin,
    MetricResult, PluginContext, PluginRegistry, ResultCache, Result, StreamConfig,
    StreamingAnalyzer, TokscopeError, WhitespaceTokenizer, telemetry,
};

// ============================================================================
// Snapshot helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum counter values for `name`, optionally filtered by one label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((k, v)) => key.key().labels().any(|l| l.key() == k && l.value() == v),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Run `fut` with a local recorder installed and return the snapshot.
fn record<F, T>(fut: F) -> (T, SnapshotVec)
where
    F: std::future::Future<Output = T>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let out = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    });
    (out, snapshotter.snapshot().into_vec())
}

struct Exploding;

impl MetricPlugin for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn calculate_metrics(&self, _ctx: &PluginContext<'_>) -> Result<Vec<MetricResult>> {
        Err(TokscopeError::Plugin {
            plugin: "exploding".into(),
            message: "boom".into(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn analysis_records_tokenization_and_duration() {
    let (result, snapshot) = record(async {
        AnalysisEngine::default()
            .analyze_document("hello world", &WhitespaceTokenizer::new())
            .await
    });
    assert!(result.is_ok());
    assert_eq!(
        counter_total(&snapshot, telemetry::TOKENIZATIONS_TOTAL, Some(("status", "ok"))),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::ANALYSIS_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_tokenization_is_labelled() {
    let (result, snapshot) = record(async {
        AnalysisEngine::default()
            .analyze_document("poison", &FailingTokenizer)
            .await
    });
    assert!(result.is_err());
    assert_eq!(
        counter_total(&snapshot, telemetry::TOKENIZATIONS_TOTAL, Some(("status", "error"))),
        1
    );
    assert!(!has_histogram(&snapshot, telemetry::ANALYSIS_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn sequential_batch_counts_items_by_status() {
    let docs = vec!["fine".to_string(), "poison".to_string(), "also fine".to_string()];
    let (_, snapshot) = record(async {
        AnalysisEngine::default()
            .analyze_batch(&docs, &FailingTokenizer, &CancelSignal::new())
            .await
    });
    assert_eq!(
        counter_total(&snapshot, telemetry::BATCH_ITEMS_TOTAL, Some(("status", "ok"))),
        2
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::BATCH_ITEMS_TOTAL, Some(("status", "error"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hits_and_misses_are_counted() {
    let (_, snapshot) = record(async {
        let cache: Arc<dyn CacheBackend> = Arc::new(ResultCache::new(&CacheConfig::new()));
        let cached = CachedTokenizer::new(Arc::new(CountingTokenizer::new("counting")), cache);
        let engine = AnalysisEngine::default();
        for _ in 0..3 {
            engine.analyze_document("same", &cached).await.unwrap();
        }
    });
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, None), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, None), 2);
}

#[test]
fn cache_evictions_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        let cache = ResultCache::new(&CacheConfig::new().max_entries(1));
        let value = Arc::new(common::split_words("x", "t"));
        cache.set(1, Arc::clone(&value));
        cache.set(2, value);
    });
    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_EVICTIONS_TOTAL, Some(("backend", "ordered"))),
        1
    );
}

#[test]
fn plugin_errors_are_counted() {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(Exploding));
    let analysis = AnalysisResult::new(
        common::split_words("a b", "t"),
        Vec::new(),
        Default::default(),
    );

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let merged = metrics::with_local_recorder(&recorder, || registry.apply(analysis));
    assert!(merged.metrics.is_empty());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::PLUGIN_ERRORS_TOTAL, Some(("plugin", "exploding"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn stream_chunks_are_counted() {
    let (_, snapshot) = record(async {
        StreamingAnalyzer::new(StreamConfig::new().chunk_size(1), AnalysisEngine::default())
            .analyze_reader(&b"ok\npoison\nok\n"[..], &FailingTokenizer, &CancelSignal::new())
            .await
    });
    assert_eq!(
        counter_total(&snapshot, telemetry::STREAM_CHUNKS_TOTAL, Some(("status", "ok"))),
        2
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::STREAM_CHUNKS_TOTAL, Some(("status", "error"))),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // no recorder installed: recording must not panic
    AnalysisEngine::default()
        .analyze_document("hello", &WhitespaceTokenizer::new())
        .await
        .unwrap();
}
