//! Reference tokenizer adapters with no external backend.
//!
//! These split text on simple boundaries and exist so the engine can be
//! exercised end to end (tests, CLI smoke runs) without a model tokenizer.

use async_trait::async_trait;

use super::Tokenizer;
use crate::error::Result;
use crate::types::{Token, TokenizationResult, VOCAB_SIZE_KEY};

/// Number of Unicode scalar values; the character tokenizer's vocabulary.
const UNICODE_SCALARS: usize = 0x11_0000;

/// FNV-1a, so whitespace token ids are stable across builds and platforms.
fn stable_id(text: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Splits on Unicode whitespace. Offsets are character positions.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self
    }

    fn split(document: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut start = 0;
        let mut pos = 0;
        for ch in document.chars() {
            if ch.is_whitespace() {
                if !current.is_empty() {
                    let text = std::mem::take(&mut current);
                    tokens.push(Token::new(text.clone(), stable_id(&text), start, pos));
                }
            } else {
                if current.is_empty() {
                    start = pos;
                }
                current.push(ch);
            }
            pos += 1;
        }
        if !current.is_empty() {
            let id = stable_id(&current);
            tokens.push(Token::new(current, id, start, pos));
        }
        tokens
    }
}

#[async_trait]
impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn vocab_size(&self) -> usize {
        0
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        Ok(TokenizationResult::new(
            document,
            Self::split(document),
            self.name(),
        ))
    }
}

/// One token per character, whitespace included. Id is the code point.
#[derive(Debug, Clone, Default)]
pub struct CharacterTokenizer;

impl CharacterTokenizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tokenizer for CharacterTokenizer {
    fn name(&self) -> &str {
        "character"
    }

    fn vocab_size(&self) -> usize {
        UNICODE_SCALARS
    }

    async fn tokenize(&self, document: &str) -> Result<TokenizationResult> {
        let tokens = document
            .chars()
            .enumerate()
            .map(|(i, ch)| Token::new(ch.to_string(), u32::from(ch), i, i + 1))
            .collect();
        Ok(TokenizationResult::new(document, tokens, self.name())
            .with_metadata(VOCAB_SIZE_KEY, UNICODE_SCALARS))
    }
}
