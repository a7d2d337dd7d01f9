//! Deterministic numeric helpers shared by the calculators.
//!
//! Every helper is total: empty input, zero denominators and `log2` of
//! values ≤ 1 produce 0 instead of NaN or infinity.

use std::collections::HashMap;
use std::hash::Hash;

/// Divide, returning 0 when the denominator is zero or the result is not finite.
pub fn safe_div(numer: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        return 0.0;
    }
    finite(numer / denom)
}

/// Replace NaN and infinities with 0.
pub fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// `log2(n)` for counts, 0 when `n <= 1`.
pub fn log2_count(n: usize) -> f64 {
    if n <= 1 { 0.0 } else { (n as f64).log2() }
}

/// Shannon entropy (bits) of a frequency table with `total` observations.
pub fn entropy_from_counts<I>(counts: I, total: usize) -> f64
where
    I: IntoIterator<Item = usize>,
{
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let h: f64 = counts
        .into_iter()
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum();
    finite(h.max(0.0))
}

/// Occurrence count per distinct item.
pub fn frequencies<T, I>(items: I) -> HashMap<T, usize>
where
    T: Eq + Hash,
    I: IntoIterator<Item = T>,
{
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    finite(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Percentile (`pct` in 0..=100) of an ascending-sorted slice, linearly
/// interpolated between the closest ranks.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            finite(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
        }
    }
}

pub fn median(sorted: &[f64]) -> f64 {
    percentile(sorted, 50.0)
}

/// Five-number-ish summary used by several calculators.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            mean: mean(&sorted),
            median: median(&sorted),
            std: std_dev(&sorted),
            min: min(&sorted),
            max: max(&sorted),
        }
    }
}
