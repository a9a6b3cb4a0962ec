//! Read-only access to a built index.
//!
//! Queries must be embedded with the same model that built the index. The loader can only
//! check this when the backend records the model, and a mismatch is reported as a warning:
//! results stay well-formed but their ranking is meaningless.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::store::{IndexManifest, Metadata, MetadataFilter, StoreError, VectorStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while opening or querying an index.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// No index exists under the requested collection.
    #[error("Index collection '{0}' not found")]
    CollectionNotFound(String),
    /// Query vectors would not fit the index.
    #[error("Embedding dimension {embedder} does not match index dimension {index}")]
    DimensionMismatch {
        /// Dimension recorded for the index.
        index: usize,
        /// Dimension produced by the query embedder.
        embedder: usize,
    },
    /// Backend read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Query embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
}

/// One search hit: banner-prefixed content and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Chunk content as embedded.
    pub content: String,
    /// Flat metadata stored with the chunk.
    pub metadata: Metadata,
    /// Similarity to the query (higher is closer).
    pub score: f32,
}

/// Aggregate facts about a loaded index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStatistics {
    /// Stored vectors.
    pub total_vectors: usize,
    /// Distinct session numbers.
    pub sessions: BTreeSet<i64>,
    /// Distinct categories.
    pub categories: BTreeSet<String>,
    /// Distinct facilitators.
    pub facilitators: BTreeSet<String>,
}

/// Opens a persisted index for querying.
pub struct VectorStoreLoader {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    collection: String,
}

impl VectorStoreLoader {
    /// Prepare to open `collection` from `store`, embedding queries with `embedder`.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    /// Open the index. Fails if it does not exist or its dimension differs from the embedder's.
    pub async fn load(self) -> Result<LoadedIndex, RetrievalError> {
        let manifest = self
            .store
            .manifest(&self.collection)
            .await?
            .ok_or_else(|| RetrievalError::CollectionNotFound(self.collection.clone()))?;

        if manifest.dimension != self.embedder.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                index: manifest.dimension,
                embedder: self.embedder.dimension(),
            });
        }
        match manifest.embedding_model.as_deref() {
            Some(model) if model != self.embedder.model() => tracing::warn!(
                collection = %self.collection,
                index_model = model,
                query_model = self.embedder.model(),
                "Index was built with a different embedding model; results may be unreliable"
            ),
            Some(_) => {}
            None => tracing::debug!(
                collection = %self.collection,
                "Index does not record its embedding model"
            ),
        }

        tracing::info!(
            collection = %self.collection,
            dimension = manifest.dimension,
            "Index loaded"
        );
        Ok(LoadedIndex {
            store: self.store,
            embedder: self.embedder,
            collection: self.collection,
            manifest,
        })
    }
}

/// Loaded index handle. Cheap to clone; every method is read-only.
#[derive(Clone)]
pub struct LoadedIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    collection: String,
    manifest: IndexManifest,
}

impl LoadedIndex {
    /// Facts recorded when the index was built.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Up to `k` chunks closest to `query` whose metadata matches every `filter` entry.
    ///
    /// A tight filter just returns fewer results.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::GenerationFailed("no embedding returned for query".to_string())
        })?;

        let hits = self
            .store
            .search(&self.collection, &vector, k, filter)
            .await?;
        tracing::debug!(
            collection = %self.collection,
            k,
            filters = filter.len(),
            hits = hits.len(),
            "Search completed"
        );
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                content: hit.record.content,
                metadata: hit.record.metadata,
                score: hit.score,
            })
            .collect())
    }

    /// [`Self::search`] restricted to one session.
    pub async fn search_by_session(
        &self,
        query: &str,
        session_number: u32,
        k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let mut filter = MetadataFilter::new();
        filter.insert("session_number".to_string(), session_number.into());
        self.search(query, k, &filter).await
    }

    /// Stored vector count.
    pub async fn count(&self) -> Result<usize, RetrievalError> {
        Ok(self.store.records(&self.collection).await?.len())
    }

    /// Totals and distinct values across the stored metadata.
    pub async fn statistics(&self) -> Result<IndexStatistics, RetrievalError> {
        let records = self.store.records(&self.collection).await?;
        let mut statistics = IndexStatistics {
            total_vectors: records.len(),
            ..IndexStatistics::default()
        };
        for record in &records {
            let metadata = &record.metadata;
            if let Some(session) = metadata.get("session_number").and_then(|v| v.as_i64()) {
                statistics.sessions.insert(session);
            }
            if let Some(category) = metadata.get("category").and_then(|v| v.as_str()) {
                statistics.categories.insert(category.to_string());
            }
            if let Some(facilitator) = metadata.get("facilitator").and_then(|v| v.as_str()) {
                statistics.facilitators.insert(facilitator.to_string());
            }
        }
        Ok(statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingClient;
    use crate::store::{EmbeddedRecord, LocalStore, MetadataValue};

    fn record(id: &str, session: Option<u32>, category: &str, vector: Vec<f32>) -> EmbeddedRecord {
        let mut metadata = Metadata::new();
        metadata.insert("session_number".into(), session.into());
        metadata.insert("category".into(), category.into());
        EmbeddedRecord {
            id: id.into(),
            content: format!("content {id}"),
            metadata,
            vector,
        }
    }

    async fn seeded_store(dir: &std::path::Path, model: &str) -> Arc<dyn VectorStore> {
        let store = LocalStore::new(dir);
        let manifest = IndexManifest {
            embedding_model: Some(model.into()),
            dimension: 4,
            created_at: None,
        };
        store
            .initialize(
                "course",
                &manifest,
                vec![
                    record("a", Some(1), "session_1", vec![1.0, 0.0, 0.0, 0.0]),
                    record("b", Some(2), "session_2", vec![0.0, 1.0, 0.0, 0.0]),
                    record("c", None, "community", vec![0.0, 0.0, 1.0, 0.0]),
                ],
            )
            .await
            .expect("seed");
        Arc::new(store)
    }

    #[tokio::test]
    async fn missing_collection_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let loader = VectorStoreLoader::new(
            Arc::new(LocalStore::new(dir.path())),
            Arc::new(HashEmbeddingClient::new(4)),
            "course",
        );
        assert!(matches!(
            loader.load().await,
            Err(RetrievalError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = seeded_store(dir.path(), "hash").await;
        let loader = VectorStoreLoader::new(store, Arc::new(HashEmbeddingClient::new(8)), "course");
        assert!(matches!(
            loader.load().await,
            Err(RetrievalError::DimensionMismatch { index: 4, embedder: 8 })
        ));
    }

    #[tokio::test]
    async fn model_mismatch_only_warns() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = seeded_store(dir.path(), "text-embedding-3-small").await;
        let index = VectorStoreLoader::new(store, Arc::new(HashEmbeddingClient::new(4)), "course")
            .load()
            .await
            .expect("loads anyway");
        assert_eq!(index.count().await.expect("count"), 3);
        assert_eq!(
            index.manifest().embedding_model.as_deref(),
            Some("text-embedding-3-small")
        );
        assert_eq!(index.manifest().dimension, 4);
    }

    #[tokio::test]
    async fn statistics_collect_distinct_values() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = seeded_store(dir.path(), "hash").await;
        let index = VectorStoreLoader::new(store, Arc::new(HashEmbeddingClient::new(4)), "course")
            .load()
            .await
            .expect("index");

        let statistics = index.statistics().await.expect("statistics");
        assert_eq!(statistics.total_vectors, 3);
        assert_eq!(statistics.sessions, BTreeSet::from([1, 2]));
        assert!(statistics.categories.contains("community"));
        assert!(statistics.facilitators.is_empty());
    }

    #[tokio::test]
    async fn session_search_never_leaks_other_sessions() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = seeded_store(dir.path(), "hash").await;
        let index = VectorStoreLoader::new(store, Arc::new(HashEmbeddingClient::new(4)), "course")
            .load()
            .await
            .expect("index");

        let hits = index
            .search_by_session("anything at all", 2, 5)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["session_number"], MetadataValue::Int(2));

        let mut unsessioned = MetadataFilter::new();
        unsessioned.insert("session_number".into(), MetadataValue::Null);
        let hits = index
            .search("anything", 5, &unsessioned)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "content c");

        assert!(index.search("  ", 5, &MetadataFilter::new()).await.expect("empty").is_empty());
    }
}
