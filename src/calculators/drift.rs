//! Divergence between two tokenizers' segmentations of the same text.
//!
//! All pairwise functions are symmetric in spirit but not necessarily in
//! value: [`position_drift`] measures sequence 2 against sequence 1.

use std::collections::{HashMap, HashSet};

use super::MetricValues;
use super::stats::safe_div;
use crate::error::{Result, TokscopeError};
use crate::types::TokenizationResult;

fn vocabulary<'a>(seq: &[&'a str]) -> HashSet<&'a str> {
    seq.iter().copied().collect()
}

/// `1 - |A ∩ B| / |A ∪ B|` over distinct token texts. Both empty → 0.
pub fn jaccard_distance(a: &[&str], b: &[&str]) -> f64 {
    1.0 - vocabulary_overlap(a, b)
}

/// `|A ∩ B| / |A ∪ B|` over distinct token texts. Both empty → 1.
pub fn vocabulary_overlap(a: &[&str], b: &[&str]) -> f64 {
    let va = vocabulary(a);
    let vb = vocabulary(b);
    let union = va.union(&vb).count();
    if union == 0 {
        return 1.0;
    }
    va.intersection(&vb).count() as f64 / union as f64
}

/// Length of the longest common subsequence under token-text equality.
///
/// Classic O(n·m) dynamic programme, kept to two rows of memory.
pub fn lcs_length(a: &[&str], b: &[&str]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // intern so the inner loop compares integers
    fn intern<'a>(ids: &mut HashMap<&'a str, u32>, seq: &[&'a str]) -> Vec<u32> {
        seq.iter()
            .map(|&s| {
                let next = ids.len() as u32;
                *ids.entry(s).or_insert(next)
            })
            .collect()
    }
    let mut ids = HashMap::new();
    let a = intern(&mut ids, a);
    let b = intern(&mut ids, b);

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &x in &a {
        for (j, &y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// LCS length divided by the longer sequence's length, in `[0, 1]`.
///
/// Two empty sequences are identical (1); one empty side scores 0.
pub fn alignment_score(a: &[&str], b: &[&str]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    lcs_length(a, b) as f64 / longest as f64
}

/// Mean distance from each token of `b` to the nearest equal-text position
/// in `a`. Unmatched tokens are excluded; no matches → 0.
pub fn position_drift(a: &[&str], b: &[&str]) -> f64 {
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, &text) in a.iter().enumerate() {
        positions.entry(text).or_default().push(i);
    }
    let mut total = 0usize;
    let mut matched = 0usize;
    for (j, &text) in b.iter().enumerate() {
        let Some(list) = positions.get(text) else {
            continue;
        };
        // list is ascending; the nearest candidates straddle the insertion point
        let idx = list.partition_point(|&p| p < j);
        let best = [idx.checked_sub(1), Some(idx)]
            .into_iter()
            .flatten()
            .filter_map(|k| list.get(k))
            .map(|&p| p.abs_diff(j))
            .min();
        if let Some(d) = best {
            total += d;
            matched += 1;
        }
    }
    safe_div(total as f64, matched as f64)
}

/// `|len1 - len2| / max(len1, len2)`; both empty → 0.
pub fn length_drift(len1: usize, len2: usize) -> f64 {
    safe_div(len1.abs_diff(len2) as f64, len1.max(len2) as f64)
}

/// Cosine similarity of the token-text frequency vectors.
///
/// Both empty → 1; one empty → 0.
pub fn content_similarity(a: &[&str], b: &[&str]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let fa = super::stats::frequencies(a.iter().copied());
    let fb = super::stats::frequencies(b.iter().copied());
    let dot: f64 = fa
        .iter()
        .filter_map(|(k, &ca)| fb.get(k).map(|&cb| ca as f64 * cb as f64))
        .sum();
    let norm = |f: &HashMap<&str, usize>| f.values().map(|&c| (c as f64).powi(2)).sum::<f64>().sqrt();
    safe_div(dot, norm(&fa) * norm(&fb)).clamp(0.0, 1.0)
}

/// Every pairwise drift metric for two token-text sequences.
pub fn calculate_drift(a: &[&str], b: &[&str]) -> MetricValues {
    let mut out = MetricValues::new();
    out.insert("jaccard_distance".into(), jaccard_distance(a, b));
    out.insert("vocabulary_overlap".into(), vocabulary_overlap(a, b));
    out.insert("alignment_score".into(), alignment_score(a, b));
    out.insert("position_drift".into(), position_drift(a, b));
    out.insert("length_drift".into(), length_drift(a.len(), b.len()));
    out.insert("content_similarity".into(), content_similarity(a, b));
    out
}

fn mean_token_chars(result: &TokenizationResult) -> f64 {
    let chars: usize = result.tokens.iter().map(|t| t.text.chars().count()).sum();
    safe_div(chars as f64, result.tokens.len() as f64)
}

/// Cross-tokenizer drift bundle for two tokenizations of one document.
///
/// Fails with [`TokscopeError::InvalidInput`] when either side is missing.
/// Empty token lists are degenerate input and produce zero-valued drift.
pub fn cross_tokenizer_drift(
    first: Option<&TokenizationResult>,
    second: Option<&TokenizationResult>,
) -> Result<MetricValues> {
    let (Some(first), Some(second)) = (first, second) else {
        return Err(TokscopeError::InvalidInput(
            "cross-tokenizer drift needs two tokenization results".into(),
        ));
    };
    let a = first.texts();
    let b = second.texts();
    let lcs = lcs_length(&a, &b);

    let mut out = MetricValues::new();
    out.insert("jaccard_distance".into(), jaccard_distance(&a, &b));
    out.insert("vocabulary_overlap".into(), vocabulary_overlap(&a, &b));
    out.insert("alignment_score".into(), alignment_score(&a, &b));
    out.insert("lcs_length".into(), lcs as f64);
    out.insert("position_drift".into(), position_drift(&a, &b));
    out.insert("token_count_drift".into(), length_drift(a.len(), b.len()));
    out.insert(
        "token_count_ratio".into(),
        safe_div(b.len() as f64, a.len() as f64),
    );
    let (avg_a, avg_b) = (mean_token_chars(first), mean_token_chars(second));
    out.insert(
        "avg_token_length_drift".into(),
        safe_div((avg_a - avg_b).abs(), avg_a.max(avg_b)),
    );
    out.insert("content_similarity".into(), content_similarity(&a, &b));
    Ok(out)
}
