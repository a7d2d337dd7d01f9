//! Shannon entropy over token-text frequencies.
//!
//! Global, normalised, bigram-conditional and rolling-window variants. All
//! functions take token texts in document order and never return NaN.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::MetricValues;
use super::stats::{self, Summary, entropy_from_counts, frequencies, log2_count, safe_div};

/// Default rolling-window width in tokens.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Denominator used by [`normalized_entropy_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationKind {
    /// `log2` of the number of distinct token texts.
    Vocab,
    /// `log2` of the token count.
    Tokens,
    /// `log2` of the total character count across tokens.
    Chars,
}

/// Shannon entropy (bits) of the token-text distribution. Empty input → 0.
pub fn shannon_entropy(texts: &[&str]) -> f64 {
    let counts = frequencies(texts.iter().copied());
    entropy_from_counts(counts.into_values(), texts.len())
}

/// Entropy divided by `log2(distinct)`, bounded to `[0, 1]`.
///
/// With one or zero distinct tokens normalisation is skipped and the raw
/// entropy (which is 0) is returned.
pub fn normalized_entropy(texts: &[&str]) -> f64 {
    let h = shannon_entropy(texts);
    let distinct = frequencies(texts.iter().copied()).len();
    if distinct <= 1 {
        return h;
    }
    safe_div(h, log2_count(distinct)).clamp(0.0, 1.0)
}

/// Entropy divided by `log2` of the quantity selected by `kind`.
pub fn normalized_entropy_by(texts: &[&str], kind: NormalizationKind) -> f64 {
    let h = shannon_entropy(texts);
    let basis = match kind {
        NormalizationKind::Vocab => frequencies(texts.iter().copied()).len(),
        NormalizationKind::Tokens => texts.len(),
        NormalizationKind::Chars => texts.iter().map(|t| t.chars().count()).sum(),
    };
    let denom = log2_count(basis);
    if denom == 0.0 { h } else { safe_div(h, denom) }
}

/// Entropy of every `window`-token slice, stride 1.
///
/// Yields `N - window + 1` values; empty when `N < window` or `window == 0`.
/// Runs in O(N) by maintaining `Σ c·log2(c)` over the window counts:
/// `H = log2(w) - Σ c·log2(c) / w`.
pub fn rolling_entropy(texts: &[&str], window: usize) -> Vec<f64> {
    if window == 0 || texts.len() < window {
        return Vec::new();
    }
    fn clog(c: usize) -> f64 {
        if c <= 1 { 0.0 } else { c as f64 * (c as f64).log2() }
    }
    // change in Σ c·log2(c) after moving one count of `key`
    fn bump<'a>(counts: &mut HashMap<&'a str, usize>, key: &'a str, add: bool) -> f64 {
        let entry = counts.entry(key).or_insert(0);
        let before = clog(*entry);
        if add {
            *entry += 1;
        } else {
            *entry -= 1;
        }
        clog(*entry) - before
    }

    let w = window as f64;
    let log_w = w.log2();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut sum_clog = 0.0;

    for text in &texts[..window] {
        sum_clog += bump(&mut counts, text, true);
    }
    let mut out = Vec::with_capacity(texts.len() - window + 1);
    out.push(stats::finite((log_w - sum_clog / w).max(0.0)));
    for i in window..texts.len() {
        sum_clog += bump(&mut counts, texts[i - window], false);
        sum_clog += bump(&mut counts, texts[i], true);
        out.push(stats::finite((log_w - sum_clog / w).max(0.0)));
    }
    out
}

/// Conditional entropy `H(next | prev)` from observed bigrams.
///
/// `p(a,b) = count(a,b) / (N-1)` and `p(b|a) = count(a,b) / count_first(a)`
/// where `count_first(a)` counts bigrams starting with `a`. Single forward
/// pass; sequences shorter than 2 yield 0.
pub fn bigram_entropy(texts: &[&str]) -> f64 {
    if texts.len() < 2 {
        return 0.0;
    }
    let mut pair_counts: HashMap<(&str, &str), usize> = HashMap::new();
    let mut first_counts: HashMap<&str, usize> = HashMap::new();
    for pair in texts.windows(2) {
        *pair_counts.entry((pair[0], pair[1])).or_insert(0) += 1;
        *first_counts.entry(pair[0]).or_insert(0) += 1;
    }
    let total = (texts.len() - 1) as f64;
    let h: f64 = pair_counts
        .iter()
        .map(|((a, _), &c)| {
            let joint = c as f64 / total;
            let conditional = safe_div(c as f64, first_counts[a] as f64);
            if conditional > 0.0 {
                -joint * conditional.log2()
            } else {
                0.0
            }
        })
        .sum();
    stats::finite(h.max(0.0))
}

/// Configuration for [`EntropyCalculator`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyConfig {
    /// Rolling-window width. Default: 100 tokens.
    pub window_size: usize,
    /// Emit the `normalized` statistic. Default: true.
    pub normalize: bool,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            normalize: true,
        }
    }
}

/// Bundles every entropy statistic into one named map.
#[derive(Debug, Clone, Default)]
pub struct EntropyCalculator {
    config: EntropyConfig,
}

impl EntropyCalculator {
    pub fn new(config: EntropyConfig) -> Self {
        Self { config }
    }

    /// Compute all entropy statistics.
    ///
    /// The configured window is clamped to the sequence length, so any
    /// non-empty sequence produces rolling statistics.
    pub fn calculate(&self, texts: &[&str]) -> MetricValues {
        let mut out = MetricValues::new();
        out.insert("global".into(), shannon_entropy(texts));
        if self.config.normalize {
            out.insert("normalized".into(), normalized_entropy(texts));
        }
        out.insert("bigram".into(), bigram_entropy(texts));
        out.insert(
            "normalized_vocab".into(),
            normalized_entropy_by(texts, NormalizationKind::Vocab),
        );
        out.insert(
            "normalized_tokens".into(),
            normalized_entropy_by(texts, NormalizationKind::Tokens),
        );
        out.insert(
            "normalized_chars".into(),
            normalized_entropy_by(texts, NormalizationKind::Chars),
        );

        let window = self.config.window_size.min(texts.len());
        let rolling = Summary::of(&rolling_entropy(texts, window));
        out.insert("rolling_window".into(), window as f64);
        out.insert("rolling_mean".into(), rolling.mean);
        out.insert("rolling_std".into(), rolling.std);
        out.insert("rolling_min".into(), rolling.min);
        out.insert("rolling_max".into(), rolling.max);
        out
    }
}
