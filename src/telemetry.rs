//! Telemetry metric name constants.
//!
//! Centralised metric names for tokscope operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `tokscope_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `tokenizer`: tokenizer name (e.g. "whitespace", "gpt2")
//! - `status`: outcome: "ok" or "error" (or "cancelled" for batch items)
//! - `backend`: cache backend: "ordered" or "moka"

/// Total tokenizer invocations made by the analysis engine.
///
/// Labels: `tokenizer`, `status` ("ok" | "error").
pub const TOKENIZATIONS_TOTAL: &str = "tokscope_tokenizations_total";

/// Wall time of a single document analysis (tokenize + calculators).
///
/// Labels: `tokenizer`.
pub const ANALYSIS_DURATION_SECONDS: &str = "tokscope_analysis_duration_seconds";

/// Total result cache hits.
///
/// Labels: `tokenizer`.
pub const CACHE_HITS_TOTAL: &str = "tokscope_cache_hits_total";

/// Total result cache misses.
///
/// Labels: `tokenizer`.
pub const CACHE_MISSES_TOTAL: &str = "tokscope_cache_misses_total";

/// Total entries evicted for capacity.
///
/// Labels: `backend`.
pub const CACHE_EVICTIONS_TOTAL: &str = "tokscope_cache_evictions_total";

/// Total items finished by batch runs (parallel or sequential).
///
/// Labels: `status` ("ok" | "error" | "cancelled").
pub const BATCH_ITEMS_TOTAL: &str = "tokscope_batch_items_total";

/// Total chunks finished by the streaming analyzer.
///
/// Labels: `status` ("ok" | "error").
pub const STREAM_CHUNKS_TOTAL: &str = "tokscope_stream_chunks_total";

/// Total plugin invocations that returned an error.
///
/// Labels: `plugin`.
pub const PLUGIN_ERRORS_TOTAL: &str = "tokscope_plugin_errors_total";
