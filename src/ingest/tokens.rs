//! Token estimates for embedding batches.

use tiktoken_rs::{CoreBPE, cl100k_base};

/// Counts tokens with the `cl100k_base` encoding, or roughly four characters per token when
/// the encoding cannot be loaded.
pub struct TokenEstimator {
    bpe: Option<CoreBPE>,
}

impl TokenEstimator {
    /// Load the encoding; failures degrade to the character heuristic.
    pub fn new() -> Self {
        let bpe = match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Tokenizer unavailable; falling back to character-based estimates"
                );
                None
            }
        };
        Self { bpe }
    }

    /// Tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.chars().count().div_ceil(4),
        }
    }

    /// Tokens across every text in a batch.
    pub fn count_batch<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> usize {
        texts.into_iter().map(|text| self.count(text)).sum()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}
