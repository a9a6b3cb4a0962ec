use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::ingest::RetryPolicy;
use crate::processing::SplitterConfig;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for ingestion and retrieval.
#[derive(Debug, Clone)]
pub struct Config {
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider and recorded in the index manifest.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Credential for the hosted embeddings API.
    pub openai_api_key: Option<String>,
    /// Base URL of the hosted embeddings API.
    pub openai_base_url: String,
    /// Backend that persists the index.
    pub index_backend: IndexBackend,
    /// Name of the collection that stores course chunks.
    pub collection_name: String,
    /// Base URL of the Qdrant instance when the Qdrant backend is selected.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Splitter window used for table-free documents.
    pub chunking: SplitterConfig,
    /// Larger splitter window used once table boundaries are marked.
    pub table_chunking: SplitterConfig,
    /// Batch sizing and rate-limit retry policy.
    pub batching: BatchConfig,
}

/// Embedding batch settings for index construction.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Number of chunks sent per embedding request.
    pub batch_size: usize,
    /// Per-request token ceiling of the embedding provider.
    pub max_batch_tokens: usize,
    /// Retry policy applied to every batch.
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_batch_tokens: 300_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic local hashing, for offline runs and smoke tests.
    Hash,
}

/// Supported index persistence backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Directory-backed index under the persistence path.
    Local,
    /// Remote Qdrant collection.
    Qdrant,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Pick up a `.env` file when present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            provider = ?config.embedding_provider,
            model = %config.embedding_model,
            backend = ?config.index_backend,
            collection = %config.collection_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let embedding_provider = match vars.optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProvider::OpenAI,
        };
        let openai_api_key = vars.optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        let index_backend = match vars.optional("INDEX_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("INDEX_BACKEND".to_string()))?,
            None => IndexBackend::Local,
        };
        let qdrant_url = vars.optional("QDRANT_URL");
        if index_backend == IndexBackend::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".to_string()));
        }

        let embedding_dimension: usize = vars.parsed("EMBEDDING_DIMENSION")?.unwrap_or(1536);
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }

        let chunking = splitter_from(
            &vars,
            ("CHUNK_SIZE", "CHUNK_OVERLAP"),
            SplitterConfig::default(),
        )?;
        let table_chunking = splitter_from(
            &vars,
            ("TABLE_CHUNK_SIZE", "TABLE_CHUNK_OVERLAP"),
            SplitterConfig::table_default(),
        )?;

        let defaults = BatchConfig::default();
        let batch_size: usize = vars
            .parsed("INGEST_BATCH_SIZE")?
            .unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue("INGEST_BATCH_SIZE".to_string()));
        }
        let retry = RetryPolicy {
            max_retries: vars
                .parsed("INGEST_MAX_RETRIES")?
                .unwrap_or(defaults.retry.max_retries),
            initial_backoff: vars
                .parsed("INGEST_INITIAL_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.initial_backoff),
            batch_pause: vars
                .parsed("INGEST_BATCH_PAUSE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.batch_pause),
            ..defaults.retry
        };

        Ok(Self {
            embedding_provider,
            embedding_model: vars
                .optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dimension,
            openai_api_key,
            openai_base_url: vars
                .optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            index_backend,
            collection_name: vars
                .optional("COLLECTION_NAME")
                .unwrap_or_else(|| "course_content".to_string()),
            qdrant_url,
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            chunking,
            table_chunking,
            batching: BatchConfig {
                batch_size,
                max_batch_tokens: vars
                    .parsed("INGEST_MAX_BATCH_TOKENS")?
                    .unwrap_or(defaults.max_batch_tokens),
                retry,
            },
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }
}

fn splitter_from<F>(
    vars: &Vars<F>,
    (size_key, overlap_key): (&str, &str),
    defaults: SplitterConfig,
) -> Result<SplitterConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let chunk_size: usize = vars.parsed(size_key)?.unwrap_or(defaults.chunk_size);
    if chunk_size == 0 {
        return Err(ConfigError::InvalidValue(size_key.to_string()));
    }
    let chunk_overlap: usize = vars.parsed(overlap_key)?.unwrap_or(defaults.chunk_overlap);
    if chunk_overlap >= chunk_size {
        return Err(ConfigError::InvalidValue(overlap_key.to_string()));
    }
    Ok(SplitterConfig {
        chunk_size,
        chunk_overlap,
    })
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for IndexBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}
