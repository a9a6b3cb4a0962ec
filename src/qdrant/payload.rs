//! Helpers for converting records to and from Qdrant payloads.

use crate::store::{EmbeddedRecord, Metadata, MetadataValue, StoredRecord};
use serde_json::{Map, Value};

/// Payload key holding the banner-prefixed chunk text.
pub(crate) const CONTENT_KEY: &str = "content";

/// Flat payload: every metadata entry plus the chunk content.
pub(crate) fn build_payload(record: &EmbeddedRecord) -> Value {
    let mut payload = Map::new();
    for (key, value) in &record.metadata {
        payload.insert(key.clone(), to_json(value));
    }
    payload.insert(CONTENT_KEY.into(), Value::String(record.content.clone()));
    Value::Object(payload)
}

/// Rebuild a record from a stored payload. Non-primitive values are dropped.
pub(crate) fn record_from_payload(id: String, mut payload: Map<String, Value>) -> StoredRecord {
    let content = match payload.remove(CONTENT_KEY) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let metadata: Metadata = payload
        .into_iter()
        .filter_map(|(key, value)| from_json(value).map(|value| (key, value)))
        .collect();
    StoredRecord {
        id,
        content,
        metadata,
    }
}

fn to_json(value: &MetadataValue) -> Value {
    match value {
        MetadataValue::Null => Value::Null,
        MetadataValue::Bool(flag) => Value::Bool(*flag),
        MetadataValue::Int(number) => Value::from(*number),
        MetadataValue::Float(number) => Value::from(*number),
        MetadataValue::Str(text) => Value::String(text.clone()),
    }
}

fn from_json(value: Value) -> Option<MetadataValue> {
    match value {
        Value::Null => Some(MetadataValue::Null),
        Value::Bool(flag) => Some(MetadataValue::Bool(flag)),
        Value::Number(number) => number
            .as_i64()
            .map(MetadataValue::Int)
            .or_else(|| number.as_f64().map(MetadataValue::Float)),
        Value::String(text) => Some(MetadataValue::Str(text)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Qdrant ids are UUID strings or integers; both are rendered as text.
pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
