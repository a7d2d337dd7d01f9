//! Tokenizer capability and the explicit tokenizer registry.
//!
//! Tokenizers are external collaborators: each adapter wraps some backend
//! and returns an ordered [`TokenizationResult`]. The analysis core only
//! depends on the [`Tokenizer`] trait. A [`TokenizerRegistry`] is built by
//! the caller and handed to the [`AdvancedManager`](crate::manager::AdvancedManager);
//! there is no process-wide registry.

mod basic;
mod cached;
#[cfg(feature = "huggingface")]
mod hf;

pub use basic::{CharacterTokenizer, WhitespaceTokenizer};
pub use cached::CachedTokenizer;
#[cfg(feature = "huggingface")]
pub use hf::HfTokenizer;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, TokscopeError};
use crate::types::TokenizationResult;

/// A tokenizer backend.
///
/// Implementations must be pure with respect to `(name, document)`: the
/// result cache relies on repeated calls producing identical output.
/// Invocation may block on I/O (subprocess, network), which is why it is
/// async.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Stable tokenizer name, used for cache keys and result attribution.
    fn name(&self) -> &str;

    /// Vocabulary size, or 0 for open-vocabulary tokenizers.
    fn vocab_size(&self) -> usize;

    /// Tokenize a document.
    ///
    /// Backend failures are reported as [`TokscopeError::Tokenization`].
    async fn tokenize(&self, document: &str) -> Result<TokenizationResult>;
}

/// Name → tokenizer map passed explicitly to the manager.
#[derive(Default, Clone)]
pub struct TokenizerRegistry {
    tokenizers: BTreeMap<String, Arc<dyn Tokenizer>>,
}

impl TokenizerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `whitespace` and `character` adapters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WhitespaceTokenizer::new()));
        registry.register(Arc::new(CharacterTokenizer::new()));
        registry
    }

    /// Register a tokenizer under its own name, replacing any previous one.
    pub fn register(&mut self, tokenizer: Arc<dyn Tokenizer>) {
        self.tokenizers
            .insert(tokenizer.name().to_string(), tokenizer);
    }

    /// Look up a tokenizer by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tokenizer>> {
        self.tokenizers
            .get(name)
            .cloned()
            .ok_or_else(|| TokscopeError::TokenizerNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tokenizers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tokenizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokenizers.is_empty()
    }

    /// Replace every registered tokenizer with `wrap(tokenizer)`.
    ///
    /// Used to put a cache in front of all backends at once.
    pub fn map(self, mut wrap: impl FnMut(Arc<dyn Tokenizer>) -> Arc<dyn Tokenizer>) -> Self {
        let tokenizers = self
            .tokenizers
            .into_iter()
            .map(|(name, t)| (name, wrap(t)))
            .collect();
        Self { tokenizers }
    }
}

impl std::fmt::Debug for TokenizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerRegistry")
            .field("tokenizers", &self.names())
            .finish()
    }
}
