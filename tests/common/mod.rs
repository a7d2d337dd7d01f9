//! Fake tokenizers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use tokscope::{Result, Token, TokenizationResult, Tokenizer, TokscopeError};

/// Whitespace split with a call counter and a configurable name.
pub struct CountingTokenizer {
    pub name: &'static str,
    pub calls: AtomicUsize,
}

impl CountingTokenizer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn split_words(document: &str, tokenizer: &str) -> TokenizationResult {
    let tokens = document
        .split_whitespace()
        .enumerate()
        .map(|(i, w)| Token::new(w, i as u32, 0, 0))
        .collect();
    TokenizationResult::new(document, tokens, tokenizer)
}

#[async_trait]
impl Tokenizer for CountingTokenizer {
    fn name(&self) -> &str {
        self.name
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(split_words(document, self.name))
    }
}

/// Fails on any document containing `poison`.
pub struct FailingTokenizer;

#[async_trait]
impl Tokenizer for FailingTokenizer {
    fn name(&self) -> &str {
        "failing"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        if document.contains("poison") {
            return Err(TokscopeError::InvalidInput("backend rejected input".into()));
        }
        Ok(split_words(document, "failing"))
    }
}

/// Sleeps before every call.
pub struct SlowTokenizer {
    pub delay: Duration,
}

#[async_trait]
impl Tokenizer for SlowTokenizer {
    fn name(&self) -> &str {
        "slow"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        tokio::time::sleep(self.delay).await;
        Ok(split_words(document, "slow"))
    }
}

pub fn corpus(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("doc {i} the cat sat on the mat number {}", i % 7))
        .collect()
}
