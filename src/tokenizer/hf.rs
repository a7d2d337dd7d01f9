//! HuggingFace tokenizers adapter.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::Tokenizer;
use crate::error::{Result, TokscopeError};
use crate::types::{Token, TokenizationResult, VOCAB_SIZE_KEY};

/// Adapter over a `tokenizers::Tokenizer` loaded from the Hub or a file.
///
/// Encoding is CPU-bound, so it runs on tokio's blocking pool rather than
/// on the calling runtime worker.
pub struct HfTokenizer {
    name: String,
    inner: Arc<tokenizers::Tokenizer>,
}

impl HfTokenizer {
    /// Load tokenizer from HuggingFace Hub.
    ///
    /// Downloads the tokenizer if not cached locally. The repo id becomes
    /// the tokenizer name.
    pub fn from_hub(repo_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            TokscopeError::Configuration(format!("Failed to initialize HF API: {}", e))
        })?;

        let repo = api.model(repo_id.to_string());

        let tokenizer_path = repo.get("tokenizer.json").map_err(|e| {
            TokscopeError::Configuration(format!(
                "Failed to download tokenizer from {}: {}",
                repo_id, e
            ))
        })?;

        Self::from_file(repo_id, &tokenizer_path)
    }

    /// Load tokenizer from a local `tokenizer.json`.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            TokscopeError::Configuration(format!(
                "Failed to load tokenizer from {:?}: {}",
                path, e
            ))
        })?;

        Ok(Self::from_tokenizer(name, inner))
    }

    /// Wrap an already constructed backend tokenizer.
    pub fn from_tokenizer(name: impl Into<String>, inner: tokenizers::Tokenizer) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(inner),
        }
    }
}

/// Map byte offsets reported by the backend to character offsets.
fn byte_to_char_table(text: &str) -> Vec<usize> {
    let mut table = vec![0; text.len() + 1];
    let mut chars = 0;
    for (byte, ch) in text.char_indices() {
        for slot in &mut table[byte..byte + ch.len_utf8()] {
            *slot = chars;
        }
        chars += 1;
    }
    table[text.len()] = chars;
    table
}

#[async_trait]
impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        let inner = Arc::clone(&self.inner);
        let owned = document.to_owned();
        let encoding = tokio::task::spawn_blocking(move || inner.encode(owned, false))
            .await
            .map_err(|e| TokscopeError::Join(e.to_string()))?
            .map_err(|e| TokscopeError::tokenization(&self.name, document, e))?;

        let table = byte_to_char_table(document);
        let char_at = |byte: usize| table[byte.min(document.len())];
        let tokens = encoding
            .get_tokens()
            .iter()
            .zip(encoding.get_ids())
            .zip(encoding.get_offsets())
            .map(|((text, &id), &(start, end))| Token::new(text.clone(), id, char_at(start), char_at(end)))
            .collect();

        Ok(TokenizationResult::new(document, tokens, &self.name)
            .with_metadata(VOCAB_SIZE_KEY, self.vocab_size()))
    }
}
