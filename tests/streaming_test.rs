//! Tests for [`StreamingAnalyzer`]: chunking, aggregation, progress,
//! failure handling and cancellation.

mod common;

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use common::{FailingTokenizer, split_words};
use tokio::io::{AsyncRead, ReadBuf};
use tokscope::{
    AnalysisEngine, CancelSignal, PluginRegistry, ProgressUpdate, Result, StreamConfig,
    StreamingAnalyzer, TokenizationResult, Tokenizer, WhitespaceTokenizer,
};

fn lines(n: usize) -> String {
    (0..n).map(|i| format!("line {i} of the stream\n")).collect()
}

fn analyzer(chunk_size: usize) -> StreamingAnalyzer {
    StreamingAnalyzer::new(
        StreamConfig::new().chunk_size(chunk_size),
        AnalysisEngine::default(),
    )
}

/// Yields `prefix`, then fails every subsequent read.
struct BrokenReader {
    prefix: Vec<u8>,
    pos: usize,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos < self.prefix.len() {
            let n = (self.prefix.len() - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.prefix[start..start + n]);
            self.pos += n;
            return Poll::Ready(Ok(()));
        }
        Poll::Ready(Err(io::Error::other("disk went away")))
    }
}

/// Cancels after tokenizing its first document.
struct CancelOnFirst {
    cancel: CancelSignal,
}

#[async_trait]
impl Tokenizer for CancelOnFirst {
    fn name(&self) -> &str {
        "cancel-on-first"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        self.cancel.cancel();
        Ok(split_words(document, "cancel-on-first"))
    }
}

// =========================================================================
// Chunking and aggregation
// =========================================================================

#[tokio::test]
async fn chunks_are_processed_in_stream_order() {
    let input = lines(10);
    let result = analyzer(3)
        .analyze_reader(input.as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;

    assert_eq!(result.total_chunks, 4);
    assert_eq!(result.successful_chunks, 4);
    assert_eq!(result.failed_chunks, 0);
    assert_eq!(result.total_lines, 10);
    assert_eq!(result.total_tokens, 50);
    let indices: Vec<usize> = result.chunk_results.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    let counts: Vec<usize> = result.chunk_results.iter().map(|c| c.line_count).collect();
    assert_eq!(counts, vec![3, 3, 3, 1]);
    assert_eq!(result.tokenizer, "whitespace");
    assert_eq!(result.success_rate(), 1.0);
}

#[tokio::test]
async fn single_chunk_aggregate_equals_document_analysis() {
    let input = "the cat\nsat on\nthe mat";
    let streamed = analyzer(10)
        .analyze_reader(input.as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    let direct = AnalysisEngine::default()
        .analyze_document(input, &WhitespaceTokenizer::new())
        .await
        .unwrap();
    assert_eq!(streamed.total_chunks, 1);
    assert_eq!(streamed.aggregated_metrics, direct.metric_values());
}

#[tokio::test]
async fn aggregate_is_mean_over_chunks() {
    let input = lines(6);
    let result = analyzer(2)
        .analyze_reader(input.as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    let name = "entropy_global";
    let mean = result
        .chunk_results
        .iter()
        .map(|c| c.metrics[name])
        .sum::<f64>()
        / result.chunk_results.len() as f64;
    assert!((result.aggregated_metrics[name] - mean).abs() < 1e-12);
}

#[tokio::test]
async fn chunk_results_can_be_dropped() {
    let input = lines(8);
    let analyzer = StreamingAnalyzer::new(
        StreamConfig::new().chunk_size(2).retain_chunk_results(false),
        AnalysisEngine::default(),
    );
    let result = analyzer
        .analyze_reader(input.as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    assert_eq!(result.total_chunks, 4);
    assert!(result.chunk_results.is_empty());
    assert!(!result.aggregated_metrics.is_empty());
}

#[tokio::test]
async fn crlf_and_invalid_utf8_are_tolerated() {
    let input: &[u8] = b"a b\r\nc \xff d\r\n";
    let result = analyzer(1)
        .analyze_reader(input, &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    assert_eq!(result.successful_chunks, 2);
    assert_eq!(result.total_tokens, 5);
    assert_eq!(result.total_bytes, input.len() as u64);
}

// =========================================================================
// Plugins and progress
// =========================================================================

#[tokio::test]
async fn plugins_run_per_chunk() {
    let plugins = PluginRegistry::from_names(&["fertility"]).unwrap();
    let analyzer = analyzer(2).with_plugins(plugins);
    let result = analyzer
        .analyze_reader(lines(4).as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    assert_eq!(result.aggregated_metrics["fertility_tokens_per_word"], 1.0);
    assert!(result.chunk_results[0].metrics.contains_key("fertility_word_count"));
}

#[tokio::test]
async fn progress_reported_every_interval() {
    let seen: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let analyzer = StreamingAnalyzer::new(
        StreamConfig::new().chunk_size(1).progress_interval(3),
        AnalysisEngine::default(),
    )
    .on_progress(move |update| sink.lock().unwrap().push(update));

    analyzer
        .analyze_reader(lines(10).as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;

    let seen = seen.lock().unwrap();
    let chunks: Vec<usize> = seen.iter().map(|u| u.chunks_processed).collect();
    assert_eq!(chunks, vec![3, 6, 9]);
    assert_eq!(seen[1].lines_processed, 6);
}

/// Records how many progress updates had reached the callback at each call.
struct ProgressObservingTokenizer {
    delivered: Arc<AtomicUsize>,
    observed: Mutex<Vec<usize>>,
}

#[async_trait]
impl Tokenizer for ProgressObservingTokenizer {
    fn name(&self) -> &str {
        "observing"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        self.observed
            .lock()
            .unwrap()
            .push(self.delivered.load(Ordering::SeqCst));
        Ok(split_words(document, "observing"))
    }
}

#[tokio::test]
async fn progress_keeps_pace_with_a_ready_source() {
    let chunks = 200;
    let seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    let delivered = Arc::new(AtomicUsize::new(0));
    let (sink, counter) = (Arc::clone(&seen), Arc::clone(&delivered));
    let config = StreamConfig::new().chunk_size(1).progress_interval(1);
    assert!(chunks > config.progress_buffer);
    let analyzer = StreamingAnalyzer::new(config, AnalysisEngine::default()).on_progress(
        move |update| {
            sink.lock().unwrap().push(update.chunks_processed);
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    let tokenizer = ProgressObservingTokenizer {
        delivered: Arc::clone(&delivered),
        observed: Mutex::new(Vec::new()),
    };

    let result = analyzer
        .analyze_reader(lines(chunks).as_bytes(), &tokenizer, &CancelSignal::new())
        .await;

    assert_eq!(result.total_chunks, chunks);
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (1..=chunks).collect::<Vec<_>>());
    // updates reach the callback while the stream is still running
    let observed = tokenizer.observed.lock().unwrap();
    assert!(observed.last().is_some_and(|&n| n >= chunks / 2), "{observed:?}");
}

#[tokio::test]
async fn zero_interval_disables_progress() {
    let calls = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&calls);
    let analyzer = StreamingAnalyzer::new(
        StreamConfig::new().chunk_size(1).progress_interval(0),
        AnalysisEngine::default(),
    )
    .on_progress(move |_| *sink.lock().unwrap() += 1);
    analyzer
        .analyze_reader(lines(5).as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    assert_eq!(*calls.lock().unwrap(), 0);
}

// =========================================================================
// Failures and cancellation
// =========================================================================

#[tokio::test]
async fn failing_chunk_does_not_stop_the_stream() {
    let input = "ok one\nok two\npoison\nok three\n";
    let result = analyzer(1)
        .analyze_reader(input.as_bytes(), &FailingTokenizer, &CancelSignal::new())
        .await;
    assert_eq!(result.total_chunks, 4);
    assert_eq!(result.successful_chunks, 3);
    assert_eq!(result.failed_chunks, 1);
    assert_eq!(result.chunk_errors[0].index, 2);
    assert_eq!(result.chunk_errors[0].start_line, 2);
    assert!((result.success_rate() - 0.75).abs() < 1e-12);
}

#[tokio::test]
async fn read_error_fails_one_chunk_and_ends_stream() {
    let reader = BrokenReader {
        prefix: b"first line\nsecond line\n".to_vec(),
        pos: 0,
    };
    let result = analyzer(1)
        .analyze_reader(reader, &WhitespaceTokenizer::new(), &CancelSignal::new())
        .await;
    assert_eq!(result.successful_chunks, 2);
    assert_eq!(result.failed_chunks, 1);
    assert_eq!(result.total_chunks, 3);
    assert!(result.chunk_errors[0].message.contains("disk went away"));
}

#[tokio::test]
async fn cancellation_returns_partial_result() {
    let cancel = CancelSignal::new();
    let tokenizer = CancelOnFirst {
        cancel: cancel.clone(),
    };
    let result = analyzer(2)
        .analyze_reader(lines(10).as_bytes(), &tokenizer, &cancel)
        .await;
    assert!(result.cancelled);
    assert_eq!(result.total_chunks, 1);
    assert_eq!(result.successful_chunks, 1);
    assert_eq!(result.total_lines, 2);
}
