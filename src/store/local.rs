//! Directory-backed index.
//!
//! Layout under the persistence root:
//!
//! ```text
//! <root>/<collection>/manifest.json   embedding model, dimension, creation time
//! <root>/<collection>/records.jsonl   one {id, content, metadata, vector} object per line
//! ```
//!
//! Each committed batch is appended as a block of lines, so a run that aborts midway leaves
//! every earlier batch readable.

use super::{
    EmbeddedRecord, IndexManifest, MetadataFilter, ScoredRecord, StoreError, StoredRecord,
    VectorStore, check_dimensions, matches_filter,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

const MANIFEST_FILE: &str = "manifest.json";
const RECORDS_FILE: &str = "records.jsonl";

/// Index persisted as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Use `root` as the persistence directory. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf, StoreError> {
        let valid = !collection.is_empty()
            && collection != "."
            && collection != ".."
            && !collection.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::io(
                collection,
                std::io::Error::new(ErrorKind::InvalidInput, "invalid collection name"),
            ));
        }
        Ok(self.root.join(collection))
    }

    async fn read_manifest(&self, collection: &str) -> Result<Option<IndexManifest>, StoreError> {
        let path = self.collection_dir(collection)?.join(MANIFEST_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::io(&path, error)),
        }
    }

    async fn require_manifest(&self, collection: &str) -> Result<IndexManifest, StoreError> {
        self.read_manifest(collection)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }

    async fn read_records(&self, collection: &str) -> Result<Vec<EmbeddedRecord>, StoreError> {
        let path = self.collection_dir(collection)?.join(RECORDS_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::io(&path, error)),
        };

        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    async fn write_records(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        records: &[EmbeddedRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        check_dimensions(manifest.dimension, records)?;

        let mut block = String::new();
        for record in records {
            block.push_str(&serde_json::to_string(record)?);
            block.push('\n');
        }

        let path = self.collection_dir(collection)?.join(RECORDS_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|error| StoreError::io(&path, error))?;
        file.write_all(block.as_bytes())
            .await
            .map_err(|error| StoreError::io(&path, error))?;
        file.flush()
            .await
            .map_err(|error| StoreError::io(&path, error))?;

        tracing::debug!(
            collection,
            records = records.len(),
            path = %path.display(),
            "Records appended"
        );
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn initialize(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        records: Vec<EmbeddedRecord>,
    ) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| StoreError::io(&dir, error))?;

        let effective = match self.read_manifest(collection).await? {
            Some(existing) => {
                if existing.dimension != manifest.dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: existing.dimension,
                        actual: manifest.dimension,
                    });
                }
                tracing::warn!(
                    collection,
                    "Collection already exists; new records are appended to it"
                );
                existing
            }
            None => {
                let path = dir.join(MANIFEST_FILE);
                let raw = serde_json::to_string_pretty(manifest)?;
                tokio::fs::write(&path, raw)
                    .await
                    .map_err(|error| StoreError::io(&path, error))?;
                tracing::debug!(collection, dimension = manifest.dimension, "Collection created");
                manifest.clone()
            }
        };

        self.write_records(collection, &effective, &records).await
    }

    async fn append(
        &self,
        collection: &str,
        records: Vec<EmbeddedRecord>,
    ) -> Result<(), StoreError> {
        let manifest = self.require_manifest(collection).await?;
        self.write_records(collection, &manifest, &records).await
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let manifest = self.require_manifest(collection).await?;
        if vector.len() != manifest.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: manifest.dimension,
                actual: vector.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ScoredRecord> = self
            .read_records(collection)
            .await?
            .into_iter()
            .filter(|record| matches_filter(&record.metadata, filter))
            .map(|record| {
                let score = cosine_similarity(vector, &record.vector);
                ScoredRecord {
                    record: StoredRecord {
                        id: record.id,
                        content: record.content,
                        metadata: record.metadata,
                    },
                    score,
                }
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>, StoreError> {
        self.read_manifest(collection).await
    }

    async fn records(&self, collection: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.require_manifest(collection).await?;
        Ok(self
            .read_records(collection)
            .await?
            .into_iter()
            .map(|record| StoredRecord {
                id: record.id,
                content: record.content,
                metadata: record.metadata,
            })
            .collect())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        let dir = self.collection_dir(collection)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(collection, path = %dir.display(), "Collection deleted");
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StoreError::io(&dir, error)),
        }
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
