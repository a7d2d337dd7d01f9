//! Compression efficiency of a tokenization relative to its source bytes.

use std::collections::HashSet;

use super::MetricValues;
use super::stats::{Summary, log2_count, safe_div, variance};
use crate::types::Token;

/// Default size in bytes of one token id in the compressed representation.
pub const DEFAULT_BYTES_PER_TOKEN: usize = 4;

/// Configuration for [`CompressionCalculator`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    /// Fixed cost of one token id. Default: 4 bytes.
    pub bytes_per_token: usize,
    /// Also charge each token's text bytes to the representation. Default: false.
    pub include_metadata: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            bytes_per_token: DEFAULT_BYTES_PER_TOKEN,
            include_metadata: false,
        }
    }
}

/// Byte-level, token-length and redundancy metrics.
#[derive(Debug, Clone, Default)]
pub struct CompressionCalculator {
    config: CompressionConfig,
}

impl CompressionCalculator {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Compute every compression metric for `text` and its `tokens`.
    ///
    /// `entropy` is the global Shannon entropy of the same token sequence.
    /// Empty text or an empty token list yields an empty map.
    pub fn calculate(&self, text: &str, tokens: &[Token], entropy: f64) -> MetricValues {
        let mut out = MetricValues::new();
        if text.is_empty() || tokens.is_empty() {
            return out;
        }
        self.byte_metrics(text, tokens, &mut out);
        Self::length_metrics(tokens, &mut out);
        Self::redundancy_metrics(tokens, entropy, &mut out);
        out
    }

    fn byte_metrics(&self, text: &str, tokens: &[Token], out: &mut MetricValues) {
        let original_bytes = text.len() as f64;
        let token_count = tokens.len() as f64;
        let representation: usize = tokens
            .iter()
            .map(|t| {
                let extra = if self.config.include_metadata { t.text.len() } else { 0 };
                self.config.bytes_per_token + extra
            })
            .sum();
        let ratio = safe_div(representation as f64, original_bytes);

        out.insert("ratio".into(), ratio);
        out.insert("space_savings_pct".into(), (1.0 - ratio) * 100.0);
        out.insert("avg_token_bytes".into(), safe_div(original_bytes, token_count));
        out.insert("token_density".into(), safe_div(token_count, original_bytes));
        out.insert(
            "char_density".into(),
            safe_div(text.chars().count() as f64, token_count),
        );
    }

    fn length_metrics(tokens: &[Token], out: &mut MetricValues) {
        let lengths: Vec<f64> = tokens.iter().map(|t| t.text.chars().count() as f64).collect();
        let summary = Summary::of(&lengths);
        out.insert("token_length_mean".into(), summary.mean);
        out.insert("token_length_variance".into(), variance(&lengths));
        out.insert("token_length_std".into(), summary.std);
        out.insert("token_length_min".into(), summary.min);
        out.insert("token_length_max".into(), summary.max);
    }

    fn redundancy_metrics(tokens: &[Token], entropy: f64, out: &mut MetricValues) {
        let distinct = tokens.iter().map(|t| t.text.as_str()).collect::<HashSet<_>>().len();
        let max_entropy = log2_count(distinct);
        let efficiency = safe_div(entropy, max_entropy).clamp(0.0, 1.0);
        out.insert(
            "vocabulary_utilization".into(),
            safe_div(distinct as f64, tokens.len() as f64),
        );
        out.insert("entropy_efficiency".into(), efficiency);
        out.insert("compression_potential".into(), 1.0 - efficiency);
    }
}
