//! Metric and per-document analysis result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Metadata, TokenizationResult};

/// A single named scalar produced by a calculator or plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    /// Metric name, unique within an [`AnalysisResult`].
    pub name: String,
    /// Tokenizer whose output the metric describes.
    #[serde(rename = "tokenizer")]
    pub tokenizer_name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MetricResult {
    pub fn new(name: impl Into<String>, tokenizer: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            tokenizer_name: tokenizer.into(),
            value,
            metadata: None,
        }
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Everything computed for one (document, tokenizer) pair.
///
/// Field names are the contract exporters and report renderers rely on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub document: String,
    #[serde(rename = "tokenizer")]
    pub tokenizer_name: String,
    pub token_count: usize,
    /// Metric name → metric. Keys are unique.
    pub metrics: BTreeMap<String, MetricResult>,
    pub tokenization: TokenizationResult,
    #[serde(default)]
    pub metadata: Metadata,
}

impl AnalysisResult {
    /// Assemble a result from a tokenization and its named metric values.
    pub fn new(
        tokenization: TokenizationResult,
        metrics: impl IntoIterator<Item = MetricResult>,
        metadata: Metadata,
    ) -> Self {
        Self {
            document: tokenization.text.clone(),
            tokenizer_name: tokenization.tokenizer_name.clone(),
            token_count: tokenization.token_count(),
            metrics: metrics.into_iter().map(|m| (m.name.clone(), m)).collect(),
            tokenization,
            metadata,
        }
    }

    /// Look up a metric value by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(|m| m.value)
    }

    /// Metric values as a plain name → value map.
    pub fn metric_values(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .map(|(k, m)| (k.clone(), m.value))
            .collect()
    }

    /// Produce a new result with `extra` metrics merged in.
    ///
    /// Existing names are kept; a clashing extra metric is dropped and the
    /// clash is returned so callers can report it.
    pub fn merged_with(mut self, extra: Vec<MetricResult>) -> (Self, Vec<String>) {
        let mut clashes = Vec::new();
        for metric in extra {
            if self.metrics.contains_key(&metric.name) {
                clashes.push(metric.name);
            } else {
                self.metrics.insert(metric.name.clone(), metric);
            }
        }
        (self, clashes)
    }
}
