//! Compiled-in plugins.

use super::{MetricPlugin, PluginContext};
use crate::calculators::stats::safe_div;
use crate::error::Result;
use crate::types::MetricResult;

/// Tokens per whitespace-delimited word, and characters per token.
///
/// Fertility near 1 means the tokenizer mostly keeps words whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct FertilityPlugin;

impl MetricPlugin for FertilityPlugin {
    fn name(&self) -> &str {
        "fertility"
    }

    fn description(&self) -> &str {
        "tokens per word and characters per token"
    }

    fn calculate_metrics(&self, ctx: &PluginContext<'_>) -> Result<Vec<MetricResult>> {
        let words = ctx.document().split_whitespace().count() as f64;
        let chars = ctx.document().chars().count() as f64;
        let tokens = ctx.analysis.token_count as f64;
        let tokenizer = ctx.tokenizer();
        Ok(vec![
            MetricResult::new("word_count", tokenizer, words),
            MetricResult::new("tokens_per_word", tokenizer, safe_div(tokens, words)),
            MetricResult::new("chars_per_token", tokenizer, safe_div(chars, tokens)),
        ])
    }
}

/// Share of tokens falling into simple character classes.
///
/// A token belongs to a class when every one of its characters does.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharsetPlugin;

fn is_ascii(c: char) -> bool {
    c.is_ascii()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
}

impl CharsetPlugin {
    const CLASSES: [(&'static str, fn(char) -> bool); 5] = [
        ("ascii_ratio", is_ascii),
        ("alphabetic_ratio", char::is_alphabetic),
        ("numeric_ratio", char::is_numeric),
        ("punctuation_ratio", is_punctuation),
        ("whitespace_ratio", char::is_whitespace),
    ];
}

impl MetricPlugin for CharsetPlugin {
    fn name(&self) -> &str {
        "charset"
    }

    fn description(&self) -> &str {
        "character-class ratios over tokens"
    }

    fn calculate_metrics(&self, ctx: &PluginContext<'_>) -> Result<Vec<MetricResult>> {
        let texts = ctx.texts();
        let total = texts.len() as f64;
        Ok(Self::CLASSES
            .iter()
            .map(|(name, class)| {
                let matching = texts
                    .iter()
                    .filter(|t| !t.is_empty() && t.chars().all(|c| class(c)))
                    .count();
                MetricResult::new(*name, ctx.tokenizer(), safe_div(matching as f64, total))
            })
            .collect())
    }
}
