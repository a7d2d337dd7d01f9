//! Output of a single tokenizer run over a document.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{Metadata, Token};

/// Metadata key under which tokenizers report their vocabulary size.
pub const VOCAB_SIZE_KEY: &str = "vocab_size";

/// A document together with the ordered tokens one tokenizer produced for it.
///
/// Token order is appearance order in the document. Produced once per
/// (tokenizer, document) pair and never mutated afterwards, which is what
/// makes it safe to cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenizationResult {
    /// The original document text.
    pub text: String,
    /// Tokens in document order.
    pub tokens: Vec<Token>,
    /// Name of the producing tokenizer.
    #[serde(rename = "tokenizer")]
    pub tokenizer_name: String,
    /// Free-form backend metadata (e.g. `vocab_size`).
    #[serde(default)]
    pub metadata: Metadata,
}

impl TokenizationResult {
    pub fn new(text: impl Into<String>, tokens: Vec<Token>, tokenizer: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens,
            tokenizer_name: tokenizer.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Number of tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Token texts in document order.
    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    /// Number of distinct token texts.
    pub fn distinct_count(&self) -> usize {
        self.tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Vocabulary size reported by the tokenizer, if any.
    pub fn vocab_size(&self) -> Option<u64> {
        self.metadata.get(VOCAB_SIZE_KEY).and_then(|v| v.as_u64())
    }
}
