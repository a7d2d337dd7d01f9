//! Memory-bounded analysis of unbounded line streams.
//!
//! Input is read line by line and grouped into chunks of
//! [`StreamConfig::chunk_size`] lines. Each chunk is joined into one
//! document and analyzed on its own, strictly in stream order. Only the
//! chunk in flight, its analysis and the running per-metric sums are held
//! in memory; per-chunk metric maps are kept as well unless
//! [`StreamConfig::retain_chunk_results`] is off.
//!
//! Progress updates are handed to a dispatcher task through a bounded
//! channel with `try_send`, so a slow callback never stalls chunk
//! processing. Updates that find the channel full are dropped. The chunk
//! loop yields after each send, so the dispatcher keeps pace on a
//! current-thread runtime even when the source never blocks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::engine::AnalysisEngine;
use crate::plugin::PluginRegistry;
use crate::telemetry;
use crate::tokenizer::Tokenizer;
use crate::types::{ChunkError, ChunkResult, ProgressUpdate, StreamResult};

/// Default lines per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of chunks between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Default number of progress updates buffered for the callback.
pub const DEFAULT_PROGRESS_BUFFER: usize = 64;

/// How long a finished stream waits for queued progress updates.
const PROGRESS_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives progress snapshots on the dispatcher task.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Configuration for [`StreamingAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Lines per chunk. Default: 1000.
    pub chunk_size: usize,
    /// Chunks between progress updates; 0 disables them. Default: 10.
    pub progress_interval: usize,
    /// Keep per-chunk metric maps in the result. Default: true.
    pub retain_chunk_results: bool,
    /// Progress channel capacity. Default: 64.
    pub progress_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            retain_chunk_results: true,
            progress_buffer: DEFAULT_PROGRESS_BUFFER,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, lines: usize) -> Self {
        self.chunk_size = lines.max(1);
        self
    }

    pub fn progress_interval(mut self, chunks: usize) -> Self {
        self.progress_interval = chunks;
        self
    }

    pub fn retain_chunk_results(mut self, retain: bool) -> Self {
        self.retain_chunk_results = retain;
        self
    }

    pub fn progress_buffer(mut self, updates: usize) -> Self {
        self.progress_buffer = updates.max(1);
        self
    }
}

/// Running per-metric sums for the mean aggregation.
#[derive(Debug, Default)]
struct MetricSums {
    sums: BTreeMap<String, (f64, usize)>,
}

impl MetricSums {
    fn add(&mut self, values: impl IntoIterator<Item = (String, f64)>) {
        for (name, value) in values {
            let slot = self.sums.entry(name).or_insert((0.0, 0));
            slot.0 += value;
            slot.1 += 1;
        }
    }

    fn means(self) -> BTreeMap<String, f64> {
        self.sums
            .into_iter()
            .map(|(name, (sum, n))| (name, sum / n as f64))
            .collect()
    }
}

/// Progress channel plus the task draining it into the callback.
struct Dispatcher {
    tx: mpsc::Sender<ProgressUpdate>,
    task: JoinHandle<()>,
}

impl Dispatcher {
    fn spawn(callback: ProgressCallback, buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(async move {
            let mut updates = ReceiverStream::new(rx);
            while let Some(update) = updates.next().await {
                callback(update);
            }
        });
        Self { tx, task }
    }

    fn send(&self, update: ProgressUpdate) {
        if self.tx.try_send(update).is_err() {
            debug!("progress callback lagging, update dropped");
        }
    }

    async fn finish(self) {
        drop(self.tx);
        let mut task = self.task;
        if tokio::time::timeout(PROGRESS_DRAIN_TIMEOUT, &mut task).await.is_err() {
            warn!("progress callback did not drain in time");
            task.abort();
        }
    }
}

/// Chunked analyzer over any `AsyncRead` source.
#[derive(Clone)]
pub struct StreamingAnalyzer {
    config: StreamConfig,
    engine: Arc<AnalysisEngine>,
    plugins: PluginRegistry,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for StreamingAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAnalyzer")
            .field("config", &self.config)
            .field("plugins", &self.plugins)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl StreamingAnalyzer {
    pub fn new(config: StreamConfig, engine: AnalysisEngine) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            plugins: PluginRegistry::new(),
            progress: None,
        }
    }

    /// Apply `plugins` to every chunk.
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Report progress every `progress_interval` chunks.
    pub fn on_progress(mut self, callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Analyze `reader` chunk by chunk until end of input.
    ///
    /// Chunk failures are recorded and the stream continues. A read error
    /// fails the chunk being assembled and ends the stream. Once `cancel`
    /// fires no further chunk is started; the partial result is returned.
    #[instrument(skip_all, fields(tokenizer = tokenizer.name(), chunk_size = self.config.chunk_size))]
    pub async fn analyze_reader<R>(
        &self,
        reader: R,
        tokenizer: &dyn Tokenizer,
        cancel: &CancelSignal,
    ) -> StreamResult
    where
        R: AsyncRead + Unpin + Send,
    {
        let started = Instant::now();
        let start_time = SystemTime::now();
        let chunk_size = self.config.chunk_size.max(1);
        let dispatcher = match (&self.progress, self.config.progress_interval) {
            (Some(callback), interval) if interval > 0 => {
                Some(Dispatcher::spawn(Arc::clone(callback), self.config.progress_buffer))
            }
            _ => None,
        };

        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut sums = MetricSums::default();
        let mut result = StreamResult {
            tokenizer: tokenizer.name().to_string(),
            total_chunks: 0,
            successful_chunks: 0,
            failed_chunks: 0,
            total_lines: 0,
            total_bytes: 0,
            total_tokens: 0,
            aggregated_metrics: BTreeMap::new(),
            chunk_results: Vec::new(),
            chunk_errors: Vec::new(),
            start_time,
            duration: Duration::ZERO,
            cancelled: false,
        };

        loop {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            let mut lines: Vec<String> = Vec::new();
            let mut eof = false;
            let mut read_error = None;
            while lines.len() < chunk_size {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(n) => {
                        result.total_bytes += n as u64;
                        lines.push(decode_line(&buf));
                    }
                    Err(e) => {
                        read_error = Some(e);
                        break;
                    }
                }
            }
            if lines.is_empty() && read_error.is_none() {
                break;
            }

            let index = result.total_chunks;
            let start_line = result.total_lines;
            result.total_chunks += 1;
            result.total_lines += lines.len();

            if let Some(e) = read_error {
                warn!(chunk = index, error = %e, "stream read failed, ending stream");
                self.record_failure(&mut result, index, start_line, format!("I/O error: {e}"));
                eof = true;
            } else {
                let document = lines.join("\n");
                drop(lines);
                match self.engine.analyze_document(&document, tokenizer).await {
                    Ok(analysis) => {
                        let analysis = self.plugins.apply(analysis);
                        metrics::counter!(telemetry::STREAM_CHUNKS_TOTAL, "status" => "ok")
                            .increment(1);
                        result.successful_chunks += 1;
                        result.total_tokens += analysis.token_count;
                        let line_count = result.total_lines - start_line;
                        let chunk = ChunkResult::from_analysis(index, start_line, line_count, &analysis);
                        sums.add(chunk.metrics.iter().map(|(k, v)| (k.clone(), *v)));
                        if self.config.retain_chunk_results {
                            result.chunk_results.push(chunk);
                        }
                        debug!(chunk = index, tokens = analysis.token_count, "chunk analyzed");
                    }
                    Err(e) => {
                        warn!(chunk = index, error = %e, "chunk failed");
                        self.record_failure(&mut result, index, start_line, e.to_string());
                    }
                }
            }

            if let Some(dispatcher) = &dispatcher
                && result.total_chunks % self.config.progress_interval == 0
            {
                dispatcher.send(ProgressUpdate {
                    chunks_processed: result.total_chunks,
                    lines_processed: result.total_lines,
                    failed_chunks: result.failed_chunks,
                    elapsed: started.elapsed(),
                });
                // a ready reader never parks this task
                tokio::task::yield_now().await;
            }

            if eof {
                break;
            }
        }

        if let Some(dispatcher) = dispatcher {
            dispatcher.finish().await;
        }
        result.aggregated_metrics = sums.means();
        result.duration = started.elapsed();
        info!(
            chunks = result.total_chunks,
            failed = result.failed_chunks,
            lines = result.total_lines,
            bytes = result.total_bytes,
            cancelled = result.cancelled,
            "stream finished"
        );
        result
    }

    fn record_failure(&self, result: &mut StreamResult, index: usize, start_line: usize, message: String) {
        metrics::counter!(telemetry::STREAM_CHUNKS_TOTAL, "status" => "error").increment(1);
        result.failed_chunks += 1;
        result.chunk_errors.push(ChunkError {
            index,
            start_line,
            message,
        });
    }
}

/// Strip the line terminator and decode as lossy UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WhitespaceTokenizer;

    #[test]
    fn decode_line_strips_terminators() {
        assert_eq!(decode_line(b"abc\r\n"), "abc");
        assert_eq!(decode_line(b"abc"), "abc");
        assert_eq!(decode_line(b"a\xffb\n"), "a\u{fffd}b");
    }

    #[test]
    fn sums_average_per_metric() {
        let mut sums = MetricSums::default();
        sums.add([("a".to_string(), 1.0), ("b".to_string(), 4.0)]);
        sums.add([("a".to_string(), 3.0)]);
        let means = sums.means();
        assert_eq!(means["a"], 2.0);
        assert_eq!(means["b"], 4.0);
    }

    #[tokio::test]
    async fn chunks_follow_line_count() {
        let input = "a b\nc d\ne f\ng h\ni j\n";
        let analyzer = StreamingAnalyzer::new(StreamConfig::new().chunk_size(2), AnalysisEngine::default());
        let result = analyzer
            .analyze_reader(input.as_bytes(), &WhitespaceTokenizer::new(), &CancelSignal::new())
            .await;
        assert_eq!(result.total_chunks, 3);
        assert_eq!(result.successful_chunks, 3);
        assert_eq!(result.total_lines, 5);
        assert_eq!(result.total_bytes, input.len() as u64);
        assert_eq!(result.total_tokens, 10);
        let starts: Vec<usize> = result.chunk_results.iter().map(|c| c.start_line).collect();
        assert_eq!(starts, vec![0, 2, 4]);
        assert_eq!(result.chunk_results[2].line_count, 1);
    }

    #[tokio::test]
    async fn empty_stream() {
        let analyzer = StreamingAnalyzer::new(StreamConfig::default(), AnalysisEngine::default());
        let result = analyzer
            .analyze_reader(&b""[..], &WhitespaceTokenizer::new(), &CancelSignal::new())
            .await;
        assert_eq!(result.total_chunks, 0);
        assert_eq!(result.success_rate(), 0.0);
        assert!(result.aggregated_metrics.is_empty());
    }
}
