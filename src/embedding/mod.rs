//! Embedding providers.

mod openai;

pub use openai::OpenAiClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider rejected the request because of its rate limit.
    #[error("Embedding provider rate limit exceeded")]
    RateLimited {
        /// Wait suggested by the provider, when it sent one.
        retry_after: Option<Duration>,
    },
    /// HTTP layer failed before receiving a response.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl EmbeddingClientError {
    /// Whether this failure is a rate-limit rejection that may succeed after waiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Model identifier recorded in the index manifest.
    fn model(&self) -> &str;

    /// Length of every produced vector.
    fn dimension(&self) -> usize;
}

/// Deterministic offline embedding client.
///
/// Bytes are folded into vector slots and the result is L2-normalized, so equal texts always
/// map to equal vectors. Useful for smoke tests and air-gapped runs; similarity is lexical at
/// best.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Model name reported for hashed vectors.
    pub const MODEL: &'static str = "hash";

    /// Construct a client producing vectors of `dimension` elements.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = (idx.wrapping_mul(31) ^ usize::from(byte)) % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        tracing::trace!(texts = texts.len(), dimension = self.dimension, "Hashing embeddings");
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn model(&self) -> &str {
        Self::MODEL
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the embedding client selected by `config`.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::GenerationFailed("OPENAI_API_KEY is not set".to_string())
            })?;
            let client = OpenAiClient::new(
                &config.openai_base_url,
                api_key,
                config.embedding_model.clone(),
                config.embedding_dimension,
            )?;
            Ok(Box::new(client))
        }
        EmbeddingProvider::Hash => Ok(Box::new(HashEmbeddingClient::new(
            config.embedding_dimension,
        ))),
    }
}
