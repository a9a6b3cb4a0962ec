//! Persistence seam for the embedding index.
//!
//! Records carry a flat metadata map of primitive values only. Both backends (the local
//! directory index and Qdrant) implement [`VectorStore`], so ingestion and retrieval never know
//! which one they are talking to.

mod local;
mod types;

pub use local::LocalStore;
pub use types::{
    EmbeddedRecord, IndexManifest, Metadata, MetadataFilter, MetadataValue, ScoredRecord,
    StoredRecord, matches_filter,
};

use crate::config::{Config, IndexBackend};
use crate::qdrant::{QdrantError, QdrantService};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while reading or writing an index.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("Index I/O failed at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Persisted record or manifest could not be (de)serialized.
    #[error("Index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Collection is absent from the backend.
    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),
    /// Vector length disagrees with the collection.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension recorded for the collection.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
}

impl StoreError {
    /// Whether the backend asked the caller to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Qdrant(error) if error.is_rate_limited())
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Reject the batch if any vector length differs from the collection's.
pub(crate) fn check_dimensions(
    expected: usize,
    records: &[EmbeddedRecord],
) -> Result<(), StoreError> {
    match records.iter().find(|record| record.vector.len() != expected) {
        Some(record) => Err(StoreError::DimensionMismatch {
            expected,
            actual: record.vector.len(),
        }),
        None => Ok(()),
    }
}

/// Storage backend holding embedded course chunks.
///
/// Writes happen only during ingestion; every read method is safe to call concurrently once
/// ingestion has finished.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if needed and persist the first batch of records.
    async fn initialize(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        records: Vec<EmbeddedRecord>,
    ) -> Result<(), StoreError>;

    /// Append a further batch of records to an initialized collection.
    async fn append(&self, collection: &str, records: Vec<EmbeddedRecord>)
    -> Result<(), StoreError>;

    /// Nearest-neighbour lookup restricted to records matching every filter entry.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Read collection-level facts recorded at build time, if the collection exists.
    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>, StoreError>;

    /// Every stored record without its vector.
    async fn records(&self, collection: &str) -> Result<Vec<StoredRecord>, StoreError>;

    /// Remove the collection and everything in it. Missing collections are not an error.
    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError>;
}

/// Open the backend selected by `config`. `persist_dir` roots the local index.
pub fn open_store(config: &Config, persist_dir: &Path) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.index_backend {
        IndexBackend::Local => {
            tracing::debug!(root = %persist_dir.display(), "Using local index");
            Ok(Arc::new(LocalStore::new(persist_dir)))
        }
        IndexBackend::Qdrant => {
            let url = config.qdrant_url.as_deref().ok_or_else(|| {
                StoreError::Qdrant(QdrantError::InvalidUrl("QDRANT_URL is not set".to_string()))
            })?;
            let service = QdrantService::new(url, config.qdrant_api_key.clone())?;
            Ok(Arc::new(service))
        }
    }
}
