//! Token reuse: how often token types repeat within a sequence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::MetricValues;
use super::entropy::shannon_entropy;
use super::stats::{Summary, log2_count, percentile, safe_div};

/// Default number of most frequent token types reported.
pub const DEFAULT_TOP_K: usize = 10;

const PERCENTILES: [u32; 5] = [25, 50, 75, 90, 95];

/// Configuration for [`ReuseCalculator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReuseConfig {
    /// Number of top token types to report. Default: 10.
    pub top_k: usize,
    /// Compute repeat/burst pattern metrics. Default: true.
    pub pattern_analysis: bool,
}

impl Default for ReuseConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            pattern_analysis: true,
        }
    }
}

/// One entry of the top-K list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFrequency {
    pub text: String,
    pub count: usize,
}

/// Scalar reuse metrics plus the most frequent token types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReuseReport {
    pub values: MetricValues,
    /// Most frequent types, descending; ties keep first-encountered order.
    pub top_tokens: Vec<TokenFrequency>,
}

/// `1 - distinct / total`; 0 for empty input.
pub fn reuse_ratio(texts: &[&str]) -> f64 {
    if texts.is_empty() {
        return 0.0;
    }
    let distinct = type_counts(texts).len();
    1.0 - safe_div(distinct as f64, texts.len() as f64)
}

/// Distinct types with their counts, in first-encountered order.
fn type_counts<'a>(texts: &[&'a str]) -> Vec<(&'a str, usize)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for &text in texts {
        match index.get(text) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(text, counts.len());
                counts.push((text, 1));
            }
        }
    }
    counts
}

/// Reuse ratio, frequency distribution, repeat patterns and efficiency.
#[derive(Debug, Clone, Default)]
pub struct ReuseCalculator {
    config: ReuseConfig,
}

impl ReuseCalculator {
    pub fn new(config: ReuseConfig) -> Self {
        Self { config }
    }

    pub fn calculate(&self, texts: &[&str]) -> ReuseReport {
        let mut values = MetricValues::new();
        let counts = type_counts(texts);
        let distinct = counts.len();
        let total = texts.len();

        let ratio = reuse_ratio(texts);
        values.insert("ratio".into(), ratio);
        values.insert("distinct_tokens".into(), distinct as f64);

        Self::frequency_metrics(&counts, &mut values);
        let top_tokens = self.top_tokens(&counts);
        for (rank, entry) in top_tokens.iter().enumerate() {
            values.insert(format!("top_{}_count", rank + 1), entry.count as f64);
        }

        if self.config.pattern_analysis {
            Self::pattern_metrics(texts, &mut values);
        }

        let vocabulary_efficiency = safe_div(distinct as f64, total as f64);
        let entropy_efficiency =
            safe_div(shannon_entropy(texts), log2_count(distinct)).clamp(0.0, 1.0);
        values.insert("vocabulary_efficiency".into(), vocabulary_efficiency);
        values.insert("entropy_efficiency".into(), entropy_efficiency);
        values.insert("compression_efficiency".into(), ratio * entropy_efficiency);

        ReuseReport { values, top_tokens }
    }

    fn frequency_metrics(counts: &[(&str, usize)], out: &mut MetricValues) {
        let mut freqs: Vec<f64> = counts.iter().map(|(_, c)| *c as f64).collect();
        freqs.sort_by(f64::total_cmp);
        let summary = Summary::of(&freqs);
        out.insert("freq_min".into(), summary.min);
        out.insert("freq_max".into(), summary.max);
        out.insert("freq_median".into(), summary.median);
        out.insert("freq_mean".into(), summary.mean);
        out.insert("freq_std".into(), summary.std);
        for p in PERCENTILES {
            out.insert(format!("freq_p{p}"), percentile(&freqs, p as f64));
        }
    }

    fn top_tokens(&self, counts: &[(&str, usize)]) -> Vec<TokenFrequency> {
        let mut ranked = counts.to_vec();
        // stable: equal counts stay in first-encountered order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(self.config.top_k)
            .map(|(text, count)| TokenFrequency {
                text: text.to_string(),
                count,
            })
            .collect()
    }

    fn pattern_metrics(texts: &[&str], out: &mut MetricValues) {
        let adjacent_pairs = texts.len().saturating_sub(1);
        let repeats = texts.windows(2).filter(|w| w[0] == w[1]).count();
        out.insert(
            "consecutive_repeat_ratio".into(),
            safe_div(repeats as f64, adjacent_pairs as f64),
        );

        let mut last_seen: HashMap<&str, usize> = HashMap::new();
        let mut gaps = Vec::new();
        for (i, &text) in texts.iter().enumerate() {
            if let Some(prev) = last_seen.insert(text, i) {
                gaps.push((i - prev) as f64);
            }
        }
        let gap_summary = Summary::of(&gaps);
        out.insert("repeat_distance_mean".into(), gap_summary.mean);
        out.insert("repeat_distance_median".into(), gap_summary.median);
        out.insert("repeat_distance_std".into(), gap_summary.std);
        out.insert("repeat_distance_min".into(), gap_summary.min);
        out.insert("repeat_distance_max".into(), gap_summary.max);

        let bursts = burst_lengths(texts);
        let burst_summary = Summary::of(&bursts);
        out.insert("burst_count".into(), bursts.len() as f64);
        out.insert("burst_max_length".into(), burst_summary.max);
        out.insert("burst_mean_length".into(), burst_summary.mean);
        out.insert("burst_median_length".into(), burst_summary.median);
    }
}

/// Lengths of runs of two or more identical consecutive tokens.
fn burst_lengths(texts: &[&str]) -> Vec<f64> {
    let mut bursts = Vec::new();
    let mut run = 1usize;
    for i in 1..=texts.len() {
        if i < texts.len() && texts[i] == texts[i - 1] {
            run += 1;
            continue;
        }
        if run >= 2 {
            bursts.push(run as f64);
        }
        run = 1;
    }
    bursts
}
