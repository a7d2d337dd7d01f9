//! Property tests for calculator bounds.

use proptest::prelude::*;

use tokscope::calculators::drift::{alignment_score, calculate_drift, lcs_length};
use tokscope::calculators::entropy::{normalized_entropy, rolling_entropy, shannon_entropy};
use tokscope::calculators::reuse::reuse_ratio;
use tokscope::calculators::{CompressionCalculator, ReuseCalculator};
use tokscope::{Token, TokenizationResult};

/// Token sequences over a small alphabet so repeats are common.
fn tokens() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-e]{1,3}", 0..60)
}

fn refs(v: &[String]) -> Vec<&str> {
    v.iter().map(String::as_str).collect()
}

proptest! {
    #[test]
    fn entropy_is_bounded_by_log_vocab(seq in tokens()) {
        let texts = refs(&seq);
        let h = shannon_entropy(&texts);
        let distinct = texts.iter().collect::<std::collections::HashSet<_>>().len();
        prop_assert!(h >= 0.0);
        prop_assert!(h <= (distinct.max(1) as f64).log2() + 1e-9);
        let n = normalized_entropy(&texts);
        prop_assert!((0.0..=1.0).contains(&n));
    }

    #[test]
    fn rolling_entropy_window_count(seq in tokens(), window in 1usize..20) {
        let texts = refs(&seq);
        let rolled = rolling_entropy(&texts, window);
        let expected = if texts.len() >= window { texts.len() - window + 1 } else { 0 };
        prop_assert_eq!(rolled.len(), expected);
        prop_assert!(rolled.iter().all(|h| h.is_finite() && *h >= 0.0));
    }

    #[test]
    fn reuse_ratio_in_unit_interval(seq in tokens()) {
        let texts = refs(&seq);
        let r = reuse_ratio(&texts);
        prop_assert!((0.0..1.0).contains(&r) || (texts.is_empty() && r == 0.0));
        let report = ReuseCalculator::default().calculate(&texts);
        prop_assert!(report.values.values().all(|v| v.is_finite()));
        prop_assert!(report.top_tokens.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn drift_metrics_are_bounded(a in tokens(), b in tokens()) {
        let (a, b) = (refs(&a), refs(&b));
        let d = calculate_drift(&a, &b);
        for key in ["jaccard_distance", "vocabulary_overlap", "alignment_score", "length_drift", "content_similarity"] {
            prop_assert!((0.0..=1.0).contains(&d[key]), "{key} = {}", d[key]);
        }
        prop_assert!((d["jaccard_distance"] + d["vocabulary_overlap"] - 1.0).abs() < 1e-12);
        prop_assert!(lcs_length(&a, &b) <= a.len().min(b.len()));
    }

    #[test]
    fn self_alignment_is_perfect(seq in tokens()) {
        let texts = refs(&seq);
        prop_assert_eq!(alignment_score(&texts, &texts), 1.0);
        prop_assert_eq!(lcs_length(&texts, &texts), texts.len());
    }

    #[test]
    fn compression_metrics_are_finite(seq in prop::collection::vec("[a-e]{1,3}", 1..40)) {
        let text = seq.join(" ");
        let tokens: Vec<Token> = seq
            .iter()
            .enumerate()
            .map(|(i, t)| Token::new(t.clone(), i as u32, 0, 0))
            .collect();
        let tokenization = TokenizationResult::new(text.clone(), tokens, "prop");
        let h = shannon_entropy(&tokenization.texts());
        let out = CompressionCalculator::default().calculate(&text, &tokenization.tokens, h);
        prop_assert!(out.values().all(|v| v.is_finite()));
        prop_assert!(out["ratio"] > 0.0);
        prop_assert!(out["space_savings_pct"] <= 100.0);
        prop_assert!((0.0..=1.0).contains(&out["entropy_efficiency"]));
    }
}
