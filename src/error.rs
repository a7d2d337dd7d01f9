//! Tokscope error types

use std::time::Duration;

/// Tokscope error types
#[derive(Debug, thiserror::Error)]
pub enum TokscopeError {
    // Backend errors
    /// A tokenizer failed on a document. Carries enough context to diagnose
    /// the failure without re-running it.
    #[error("tokenization failed ({tokenizer}, {document}): {message}")]
    Tokenization {
        tokenizer: String,
        document: String,
        message: String,
    },

    #[error("tokenizer not found: {0}")]
    TokenizerNotFound(String),

    // Input errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Resource errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// A document's processing panicked or its worker died.
    #[error("worker task failed: {0}")]
    Join(String),

    // Run control
    /// A document was still in flight when the run's time limit passed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TokscopeError {
    /// Build a wrapped backend error for `tokenizer` failing on `document`.
    ///
    /// The document is summarised by [`document_label`] so that multi-megabyte
    /// inputs never end up in log lines.
    pub fn tokenization(
        tokenizer: impl Into<String>,
        document: &str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Tokenization {
            tokenizer: tokenizer.into(),
            document: document_label(document),
            message: message.to_string(),
        }
    }
}

const LABEL_PREVIEW_CHARS: usize = 32;

/// Short, log-safe identity for a document: its length plus a preview.
pub fn document_label(document: &str) -> String {
    let chars = document.chars().count();
    let preview: String = document
        .chars()
        .take(LABEL_PREVIEW_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if chars > LABEL_PREVIEW_CHARS {
        format!("{chars} chars: \"{preview}...\"")
    } else {
        format!("{chars} chars: \"{preview}\"")
    }
}

/// Result type alias for Tokscope operations
pub type Result<T> = std::result::Result<T, TokscopeError>;
