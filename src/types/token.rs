//! Token types for tokenization results.

use serde::{Deserialize, Serialize};

use super::Metadata;

/// A single token from tokenization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Text segment covered by the token.
    pub text: String,
    /// Token ID in the producing tokenizer's vocabulary.
    pub id: u32,
    /// Start character offset in the original text.
    pub start: usize,
    /// End character offset in the original text (exclusive).
    pub end: usize,
    /// Backend-specific extras (e.g. special-token flags).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Token {
    /// Create a new token.
    pub fn new(text: impl Into<String>, id: u32, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            id,
            start,
            end,
            metadata: None,
        }
    }

    /// Attach backend-specific metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Number of characters spanned in the original text.
    pub fn char_len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}
