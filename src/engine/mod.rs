//! Per-document analysis: tokenize once, run every calculator, merge.
//!
//! The engine holds only immutable calculator configuration, so one
//! instance is shared freely between executor workers and stream runs.
//! Calculator outputs are merged under a prefix per calculator:
//! `entropy_*`, `compression_*` and `reuse_*`.

use std::collections::BTreeMap;
use std::time::Instant;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::calculators::{
    CompressionCalculator, CompressionConfig, EntropyCalculator, EntropyConfig, MetricValues,
    ReuseCalculator, ReuseConfig, cross_tokenizer_drift,
};
use crate::cancel::CancelSignal;
use crate::error::{Result, TokscopeError, document_label};
use crate::telemetry;
use crate::tokenizer::Tokenizer;
use crate::types::{
    AnalysisResult, BatchResult, ItemError, Metadata, MetricResult, ProcessingStats,
    TokenizationResult,
};

/// Metadata key holding the reuse calculator's top-K list.
pub const TOP_TOKENS_KEY: &str = "reuse_top_tokens";

/// Configuration for [`AnalysisEngine`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub entropy: EntropyConfig,
    pub compression: CompressionConfig,
    pub reuse: ReuseConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rolling entropy window in tokens.
    pub fn rolling_window(mut self, tokens: usize) -> Self {
        self.entropy.window_size = tokens;
        self
    }

    pub fn normalize_entropy(mut self, enabled: bool) -> Self {
        self.entropy.normalize = enabled;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.reuse.top_k = k;
        self
    }

    pub fn pattern_analysis(mut self, enabled: bool) -> Self {
        self.reuse.pattern_analysis = enabled;
        self
    }

    pub fn bytes_per_token(mut self, bytes: usize) -> Self {
        self.compression.bytes_per_token = bytes;
        self
    }

    pub fn include_metadata(mut self, enabled: bool) -> Self {
        self.compression.include_metadata = enabled;
        self
    }
}

/// Every tokenizer's analysis of one document plus pairwise drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerComparison {
    /// Tokenizer name → analysis.
    pub results: BTreeMap<String, AnalysisResult>,
    /// `"<first>_vs_<second>"` → drift metrics, for every unordered pair in
    /// the order tokenizers were given.
    pub drift: BTreeMap<String, MetricValues>,
}

/// Runs the entropy, compression and reuse calculators over tokenizer output.
#[derive(Debug, Clone, Default)]
pub struct AnalysisEngine {
    entropy: EntropyCalculator,
    compression: CompressionCalculator,
    reuse: ReuseCalculator,
}

impl AnalysisEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            entropy: EntropyCalculator::new(config.entropy),
            compression: CompressionCalculator::new(config.compression),
            reuse: ReuseCalculator::new(config.reuse),
        }
    }

    /// Tokenize `document` and analyze the result.
    ///
    /// Tokenizer failures surface as [`TokscopeError::Tokenization`]; no
    /// partial result is produced.
    #[instrument(skip(self, document, tokenizer), fields(tokenizer = tokenizer.name(), chars = document.len()))]
    pub async fn analyze_document(
        &self,
        document: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<AnalysisResult> {
        let start = Instant::now();
        let tokenization = tokenize(document, tokenizer).await?;
        let mut result = self.analyze_tokenization(tokenization);
        if tokenizer.vocab_size() > 0 {
            result
                .metadata
                .insert("vocab_size".into(), tokenizer.vocab_size().into());
        }
        metrics::histogram!(telemetry::ANALYSIS_DURATION_SECONDS,
            "tokenizer" => tokenizer.name().to_owned(),
        )
        .record(start.elapsed().as_secs_f64());
        debug!(tokens = result.token_count, "document analyzed");
        Ok(result)
    }

    /// Run the calculators over an existing tokenization. Pure and
    /// synchronous.
    pub fn analyze_tokenization(&self, tokenization: TokenizationResult) -> AnalysisResult {
        let tokenizer = tokenization.tokenizer_name.clone();
        let texts = tokenization.texts();

        let entropy = self.entropy.calculate(&texts);
        let global = entropy.get("global").copied().unwrap_or(0.0);
        let compression = self
            .compression
            .calculate(&tokenization.text, &tokenization.tokens, global);
        let reuse = self.reuse.calculate(&texts);

        let mut metrics: Vec<MetricResult> = Vec::new();
        let mut push = |prefix: &str, values: MetricValues| {
            metrics.extend(
                values
                    .into_iter()
                    .map(|(k, v)| MetricResult::new(format!("{prefix}_{k}"), &tokenizer, v)),
            );
        };
        push("entropy", entropy);
        push("compression", compression);
        push("reuse", reuse.values);

        // the reuse top-K counts carry their token text
        for (rank, entry) in reuse.top_tokens.iter().enumerate() {
            let name = format!("reuse_top_{}_count", rank + 1);
            if let Some(metric) = metrics.iter_mut().find(|m| m.name == name) {
                metric
                    .metadata
                    .get_or_insert_with(Metadata::new)
                    .insert("token".into(), entry.text.clone().into());
            }
        }

        let mut metadata = Metadata::new();
        if !reuse.top_tokens.is_empty() {
            metadata.insert(
                TOP_TOKENS_KEY.into(),
                serde_json::to_value(&reuse.top_tokens).unwrap_or_default(),
            );
        }
        AnalysisResult::new(tokenization, metrics, metadata)
    }

    /// Analyze `documents` one after another.
    ///
    /// Failures are recorded per item and never abort the run. Once
    /// `cancel` fires the current document finishes and the rest are
    /// skipped.
    #[instrument(skip_all, fields(tokenizer = tokenizer.name(), batch_size = documents.len()))]
    pub async fn analyze_batch(
        &self,
        documents: &[String],
        tokenizer: &dyn Tokenizer,
        cancel: &CancelSignal,
    ) -> BatchResult<AnalysisResult> {
        let mut stats = ProcessingStats::start(documents.len());
        stats.workers_used = 1;
        stats.batch_size = documents.len();
        stats.batch_count = usize::from(!documents.is_empty());

        let mut results = Vec::with_capacity(documents.len());
        let mut errors = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            match self.analyze_document(document, tokenizer).await {
                Ok(result) => {
                    stats.processed_items += 1;
                    record_item("ok");
                    results.push(result);
                }
                Err(e) => {
                    stats.failed_items += 1;
                    record_item("error");
                    warn!(index, error = %e, "document failed");
                    errors.push(ItemError {
                        index,
                        document: document_label(document),
                        message: e.to_string(),
                    });
                }
            }
        }
        stats.finish();
        if stats.cancelled {
            metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => "cancelled")
                .increment(stats.skipped_items as u64);
        }
        info!(
            processed = stats.processed_items,
            failed = stats.failed_items,
            skipped = stats.skipped_items,
            "sequential batch finished"
        );
        BatchResult {
            results,
            errors,
            stats,
        }
    }

    /// Analyze `document` with every tokenizer and compute pairwise drift.
    ///
    /// Needs at least two tokenizers with distinct names. Any tokenizer
    /// failure fails the comparison.
    #[instrument(skip_all, fields(tokenizers = tokenizers.len()))]
    pub async fn compare_tokenizers(
        &self,
        document: &str,
        tokenizers: &[&dyn Tokenizer],
    ) -> Result<TokenizerComparison> {
        if tokenizers.len() < 2 {
            return Err(TokscopeError::InvalidInput(format!(
                "comparison needs at least 2 tokenizers, got {}",
                tokenizers.len()
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for t in tokenizers {
            if !seen.insert(t.name()) {
                return Err(TokscopeError::InvalidInput(format!(
                    "tokenizer '{}' listed twice",
                    t.name()
                )));
            }
        }

        let analyses = try_join_all(
            tokenizers
                .iter()
                .map(|t| self.analyze_document(document, *t)),
        )
        .await?;

        let mut drift = BTreeMap::new();
        for (i, first) in analyses.iter().enumerate() {
            for second in &analyses[i + 1..] {
                let key = format!("{}_vs_{}", first.tokenizer_name, second.tokenizer_name);
                let values =
                    cross_tokenizer_drift(Some(&first.tokenization), Some(&second.tokenization))?;
                drift.insert(key, values);
            }
        }
        let results = analyses
            .into_iter()
            .map(|a| (a.tokenizer_name.clone(), a))
            .collect();
        Ok(TokenizerComparison { results, drift })
    }
}

/// Invoke `tokenizer`, wrapping backend errors with tokenizer and document
/// context and recording the outcome.
pub(crate) async fn tokenize(document: &str, tokenizer: &dyn Tokenizer) -> Result<TokenizationResult> {
    let outcome = tokenizer.tokenize(document).await;
    let status = if outcome.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::TOKENIZATIONS_TOTAL,
        "tokenizer" => tokenizer.name().to_owned(),
        "status" => status,
    )
    .increment(1);
    outcome.map_err(|e| match e {
        TokscopeError::Tokenization { .. } => e,
        other => TokscopeError::tokenization(tokenizer.name(), document, other),
    })
}

fn record_item(status: &'static str) {
    metrics::counter!(telemetry::BATCH_ITEMS_TOTAL, "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{CharacterTokenizer, WhitespaceTokenizer};

    #[tokio::test]
    async fn cat_sentence_metrics() {
        let engine = AnalysisEngine::default();
        let result = engine
            .analyze_document("the cat sat on the mat", &WhitespaceTokenizer::new())
            .await
            .unwrap();
        assert_eq!(result.token_count, 6);
        assert_eq!(result.tokenizer_name, "whitespace");
        let reuse = result.metric("reuse_ratio").unwrap();
        assert!((reuse - (1.0 - 5.0 / 6.0)).abs() < 1e-9);
        let h = result.metric("entropy_global").unwrap();
        assert!((h - 2.2516291673878226).abs() < 1e-9);
        assert!(result.metric("compression_ratio").is_some());
    }

    #[tokio::test]
    async fn top_tokens_are_recorded() {
        let engine = AnalysisEngine::new(EngineConfig::new().top_k(2));
        let result = engine
            .analyze_document("the cat sat on the mat", &WhitespaceTokenizer::new())
            .await
            .unwrap();
        let top = &result.metrics["reuse_top_1_count"];
        assert_eq!(top.value, 2.0);
        assert_eq!(top.metadata.as_ref().unwrap()["token"], "the");
        assert_eq!(result.metadata[TOP_TOKENS_KEY][0]["text"], "the");
        assert!(result.metric("reuse_top_3_count").is_none());
    }

    #[tokio::test]
    async fn empty_document_has_no_errors() {
        let engine = AnalysisEngine::default();
        let result = engine
            .analyze_document("", &WhitespaceTokenizer::new())
            .await
            .unwrap();
        assert_eq!(result.token_count, 0);
        assert_eq!(result.metric("entropy_global"), Some(0.0));
        assert!(result.metric("compression_ratio").is_none());
        assert!(result.metrics.values().all(|m| m.value.is_finite()));
    }

    #[tokio::test]
    async fn compare_keys_pairs_in_given_order() {
        let engine = AnalysisEngine::default();
        let ws = WhitespaceTokenizer::new();
        let ch = CharacterTokenizer::new();
        let cmp = engine
            .compare_tokenizers("ab ab", &[&ws, &ch])
            .await
            .unwrap();
        assert_eq!(cmp.results.len(), 2);
        assert!(cmp.drift.contains_key("whitespace_vs_character"));
    }

    #[tokio::test]
    async fn compare_needs_two_distinct_tokenizers() {
        let engine = AnalysisEngine::default();
        let ws = WhitespaceTokenizer::new();
        assert!(matches!(
            engine.compare_tokenizers("x", &[&ws]).await,
            Err(TokscopeError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.compare_tokenizers("x", &[&ws, &ws]).await,
            Err(TokscopeError::InvalidInput(_))
        ));
    }
}
