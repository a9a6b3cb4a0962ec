//! Index construction: discover, load, then embed and persist in ordered batches.

use super::{
    discovery::discover_files,
    retry::{Failure, RetryMachine, RetryState},
    stats::IngestStatistics,
    tokens::TokenEstimator,
};
use crate::config::BatchConfig;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::processing::{Chunk, DocumentProcessor, SourceFile};
use crate::store::{EmbeddedRecord, IndexManifest, StoreError, VectorStore};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Why a single batch attempt failed.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Embedding request failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Persisting the batch failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Provider returned a different number of vectors than texts sent.
    #[error("expected {expected} embeddings, received {actual}")]
    CountMismatch {
        /// Texts sent.
        expected: usize,
        /// Vectors received.
        actual: usize,
    },
}

impl BatchError {
    /// Whether the failure is a rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Embedding(error) => error.is_rate_limited(),
            Self::Store(error) => error.is_rate_limited(),
            Self::CountMismatch { .. } => false,
        }
    }

    fn failure(&self) -> Failure {
        match self {
            Self::Embedding(EmbeddingClientError::RateLimited { retry_after }) => {
                Failure::RateLimited {
                    retry_after: *retry_after,
                }
            }
            error if error.is_rate_limited() => Failure::RateLimited { retry_after: None },
            _ => Failure::Fatal,
        }
    }
}

/// Errors that end an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Discovery returned nothing.
    #[error("no files found under {0}")]
    NoFilesFound(String),
    /// Every discovered file was skipped.
    #[error("no documents could be loaded from {files} discovered file(s)")]
    NoDocumentsLoaded {
        /// Files that were attempted.
        files: usize,
    },
    /// A batch could not be committed; earlier batches stay persisted.
    #[error("batch {batch} of {total} failed after {attempts} attempt(s): {source}")]
    Batch {
        /// 1-based batch number.
        batch: usize,
        /// Number of batches in the run.
        total: usize,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last failure.
        #[source]
        source: BatchError,
    },
    /// Clearing the collection before a rebuild failed.
    #[error("failed to reset collection: {0}")]
    Reset(#[source] StoreError),
}

/// Outcome of committing all batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Batches committed.
    pub batches: usize,
    /// Records persisted.
    pub records: usize,
    /// Rate-limit retries performed across all batches.
    pub retries: u32,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Counters accumulated during discovery and loading.
    pub statistics: IngestStatistics,
    /// What was written to the index.
    pub index: IndexSummary,
}

/// Builds an index from a content root.
pub struct VectorStoreCreator {
    processor: DocumentProcessor,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    collection: String,
    batching: BatchConfig,
    tokens: TokenEstimator,
}

impl VectorStoreCreator {
    /// Wire the pipeline together.
    pub fn new(
        processor: DocumentProcessor,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        batching: BatchConfig,
    ) -> Self {
        Self {
            processor,
            embedder,
            store,
            collection: collection.into(),
            batching,
            tokens: TokenEstimator::new(),
        }
    }

    /// Supported files under `root`.
    pub fn discover_files(&self, root: &Path) -> Vec<SourceFile> {
        discover_files(root)
    }

    /// Delete the target collection so the next run starts empty.
    pub async fn reset(&self) -> Result<(), IngestError> {
        tracing::info!(collection = %self.collection, "Resetting collection");
        self.store
            .delete_collection(&self.collection)
            .await
            .map_err(IngestError::Reset)
    }

    /// Discover, load, and index everything under `root`.
    pub async fn run(&self, root: &Path) -> Result<IngestReport, IngestError> {
        let files = self.discover_files(root);
        if files.is_empty() {
            tracing::error!(root = %root.display(), "No files found");
            return Err(IngestError::NoFilesFound(root.display().to_string()));
        }

        let mut statistics = IngestStatistics {
            files_discovered: files.len(),
            ..IngestStatistics::default()
        };
        let chunks = self.load_documents(&files, &mut statistics);
        if statistics.documents_loaded == 0 {
            tracing::error!(files = files.len(), "No documents could be loaded");
            return Err(IngestError::NoDocumentsLoaded { files: files.len() });
        }

        let index = self.create_vector_store(chunks).await?;
        Ok(IngestReport { statistics, index })
    }

    /// Load every file in order, folding results into `statistics`.
    pub fn load_documents(
        &self,
        files: &[SourceFile],
        statistics: &mut IngestStatistics,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (position, file) in files.iter().enumerate() {
            tracing::debug!(
                file = %file.relative_path(),
                position = position + 1,
                total = files.len(),
                "Loading document"
            );
            match self.processor.load_processed(file) {
                Some(document) if !document.chunks.is_empty() => {
                    statistics.record_document(file, &document);
                    chunks.extend(document.chunks);
                }
                _ => {
                    tracing::warn!(file = %file.relative_path(), "Document skipped");
                    statistics.record_skipped();
                }
            }
        }
        tracing::info!(
            documents = statistics.documents_loaded,
            skipped = statistics.files_skipped,
            chunks = chunks.len(),
            "Documents loaded"
        );
        chunks
    }

    /// Embed and persist `chunks` in fixed-size batches, in order.
    ///
    /// The first batch initializes the collection and later batches append to it. A batch
    /// that exhausts its retries stops the run; batches already committed stay in the index.
    pub async fn create_vector_store(&self, chunks: Vec<Chunk>) -> Result<IndexSummary, IngestError> {
        let mut summary = IndexSummary::default();
        if chunks.is_empty() {
            tracing::warn!(collection = %self.collection, "No chunks to index");
            return Ok(summary);
        }

        let manifest = IndexManifest {
            embedding_model: Some(self.embedder.model().to_string()),
            dimension: self.embedder.dimension(),
            created_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        };
        let batch_size = self.batching.batch_size.max(1);
        let total = chunks.len().div_ceil(batch_size);
        tracing::info!(
            collection = %self.collection,
            chunks = chunks.len(),
            batches = total,
            batch_size,
            "Creating vector store"
        );

        for (index, batch) in chunks.chunks(batch_size).enumerate() {
            let number = index + 1;
            let estimated = self
                .tokens
                .count_batch(batch.iter().map(|chunk| chunk.content.as_str()));
            if estimated > self.batching.max_batch_tokens {
                tracing::warn!(
                    batch = number,
                    estimated,
                    limit = self.batching.max_batch_tokens,
                    "Batch may exceed the provider token limit"
                );
            }

            let attempts = self.commit_batch(number, total, &manifest, batch).await?;
            summary.batches += 1;
            summary.records += batch.len();
            summary.retries += attempts - 1;

            let pause = self.batching.retry.batch_pause;
            if number < total && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        tracing::info!(
            collection = %self.collection,
            batches = summary.batches,
            records = summary.records,
            retries = summary.retries,
            "Vector store created"
        );
        Ok(summary)
    }

    async fn commit_batch(
        &self,
        number: usize,
        total: usize,
        manifest: &IndexManifest,
        batch: &[Chunk],
    ) -> Result<u32, IngestError> {
        let mut machine = RetryMachine::new(self.batching.retry);
        loop {
            let error = match self.attempt_batch(number == 1, manifest, batch).await {
                Ok(()) => {
                    let attempts = machine.attempts();
                    machine.record_success();
                    tracing::info!(batch = number, total, attempts, "Batch committed");
                    return Ok(attempts);
                }
                Err(error) => error,
            };

            match machine.record_failure(error.failure()) {
                RetryState::Backoff { attempt, delay } => {
                    tracing::warn!(
                        batch = number,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    machine.resume();
                }
                _ => {
                    let attempts = machine.attempts();
                    tracing::error!(batch = number, total, attempts, error = %error, "Batch failed");
                    return Err(IngestError::Batch {
                        batch: number,
                        total,
                        attempts,
                        source: error,
                    });
                }
            }
        }
    }

    async fn attempt_batch(
        &self,
        initialize: bool,
        manifest: &IndexManifest,
        batch: &[Chunk],
    ) -> Result<(), BatchError> {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;
        if vectors.len() != batch.len() {
            return Err(BatchError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }

        let records: Vec<EmbeddedRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedRecord {
                id: Uuid::new_v4().to_string(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                vector,
            })
            .collect();

        if initialize {
            self.store
                .initialize(&self.collection, manifest, records)
                .await?;
        } else {
            self.store.append(&self.collection, records).await?;
        }
        Ok(())
    }
}
