//! Cache decorator for any [`Tokenizer`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::Tokenizer;
use crate::cache::{CacheBackend, cache_key};
use crate::error::Result;
use crate::telemetry;
use crate::types::TokenizationResult;

/// Serves repeated `(tokenizer, document)` pairs from a [`CacheBackend`].
///
/// The backend only serves an entry whose tokenizer name and text match the
/// request, so a hash collision is counted and retokenized as a miss.
/// Failed tokenizations are never cached.
pub struct CachedTokenizer {
    inner: Arc<dyn Tokenizer>,
    cache: Arc<dyn CacheBackend>,
}

impl CachedTokenizer {
    pub fn new(inner: Arc<dyn Tokenizer>, cache: Arc<dyn CacheBackend>) -> Self {
        Self { inner, cache }
    }

    /// The wrapped tokenizer.
    pub fn inner(&self) -> &Arc<dyn Tokenizer> {
        &self.inner
    }
}

impl std::fmt::Debug for CachedTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTokenizer")
            .field("tokenizer", &self.inner.name())
            .field("backend", &self.cache.backend_name())
            .finish()
    }
}

#[async_trait]
impl Tokenizer for CachedTokenizer {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        let name = self.inner.name();
        let key = cache_key(name, document);
        let hit = self
            .cache
            .get_if(key, &|stored| stored.tokenizer_name == name && stored.text == document);
        if let Some(hit) = hit {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "tokenizer" => name.to_owned())
                .increment(1);
            return Ok(TokenizationResult::clone(&hit));
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "tokenizer" => name.to_owned())
            .increment(1);
        trace!(tokenizer = name, "cache miss");

        let result = self.inner.tokenize(document).await?;
        self.cache.set(key, Arc::new(result.clone()));
        Ok(result)
    }
}
