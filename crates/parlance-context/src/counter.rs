//! Token counting backends.
//!
//! Exact subword counts directly bound request size, so the HuggingFace
//! tokenizer is preferred whenever a `tokenizer.json` matching the target
//! model's vocabulary is available. The chars/4 estimate is the documented
//! fallback and is what tests use for determinism.

use std::path::Path;

use parlance_core::{Error, Result};

/// Deterministic token cost of a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Approximate counter: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimate;

impl TokenCounter for CharEstimate {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Exact counter backed by a HuggingFace tokenizer file.
pub struct HfCounter {
    tokenizer: tokenizers::Tokenizer,
}

impl HfCounter {
    /// Load a `tokenizer.json` consistent with the target model's vocabulary.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to load tokenizer: {}", e)))?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfCounter {
    fn count(&self, text: &str) -> usize {
        // Encoding failure means the text cannot be sent verbatim anyway;
        // fall back to the estimate rather than undercounting to zero.
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len(),
            Err(_) => CharEstimate.count(text),
        }
    }
}
