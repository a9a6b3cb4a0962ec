use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primitive metadata value accepted by the index.
///
/// The index stores flat maps only; list-valued fields are joined into delimited strings before
/// they reach this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Explicitly absent value.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    Str(String),
}

impl MetadataValue {
    /// Exact-match comparison used by filters. Integers and floats compare numerically.
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (Self::Int(left), Self::Float(right)) | (Self::Float(right), Self::Int(left)) => {
                (*left as f64) == *right
            }
            _ => self == other,
        }
    }

    /// Borrow the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether the value is [`MetadataValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<MetadataValue>> From<Option<T>> for MetadataValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Flat metadata persisted with each record.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Exact-match constraints; a record passes when every entry matches.
pub type MetadataFilter = BTreeMap<String, MetadataValue>;

/// Check a record's metadata against a filter. Missing keys only satisfy `Null` constraints.
pub fn matches_filter(metadata: &Metadata, filter: &MetadataFilter) -> bool {
    filter.iter().all(|(key, expected)| match metadata.get(key) {
        Some(actual) => actual.matches(expected),
        None => expected.is_null(),
    })
}

/// Record ready for persistence, including its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedRecord {
    /// Identifier assigned at ingestion time.
    pub id: String,
    /// Banner-prefixed chunk content.
    pub content: String,
    /// Flat primitive metadata.
    pub metadata: Metadata,
    /// Embedding vector for `content`.
    pub vector: Vec<f32>,
}

/// Persisted record as returned by reads.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Identifier assigned at ingestion time.
    pub id: String,
    /// Banner-prefixed chunk content.
    pub content: String,
    /// Flat primitive metadata.
    pub metadata: Metadata,
}

/// Search hit with its similarity score (higher is closer).
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// Matching record.
    pub record: StoredRecord,
    /// Cosine similarity between query and record vectors.
    pub score: f32,
}

/// Collection-level facts recorded when the index is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Embedding model used at build time, when the backend records it.
    pub embedding_model: Option<String>,
    /// Vector dimensionality of the collection.
    pub dimension: usize,
    /// RFC 3339 creation timestamp, when known.
    #[serde(default)]
    pub created_at: Option<String>,
}
