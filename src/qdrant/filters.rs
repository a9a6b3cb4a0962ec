//! Translate metadata filters into Qdrant filter payloads.

use crate::store::{MetadataFilter, MetadataValue};
use serde_json::{Value, json};

/// Compose a `must` filter where every entry is an exact-match condition.
///
/// A `Null` constraint matches points whose key is null or missing, the same rule the local
/// backend applies. Floats become a degenerate range, since Qdrant's `match` only covers
/// keywords, integers and booleans.
pub fn build_search_filter(filter: &MetadataFilter) -> Option<Value> {
    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| condition(key, value))
        .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

fn condition(key: &str, value: &MetadataValue) -> Value {
    match value {
        MetadataValue::Null => json!({
            "should": [
                { "is_null": { "key": key } },
                { "is_empty": { "key": key } }
            ]
        }),
        MetadataValue::Bool(flag) => json!({ "key": key, "match": { "value": flag } }),
        MetadataValue::Int(number) => json!({ "key": key, "match": { "value": number } }),
        MetadataValue::Float(number) => {
            json!({ "key": key, "range": { "gte": number, "lte": number } })
        }
        MetadataValue::Str(text) => json!({ "key": key, "match": { "value": text } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_is_omitted() {
        assert!(build_search_filter(&MetadataFilter::new()).is_none());
    }

    #[test]
    fn entries_become_must_conditions() {
        let mut filter = MetadataFilter::new();
        filter.insert("session_number".into(), 2u32.into());
        filter.insert("facilitator".into(), MetadataValue::Null);
        filter.insert("category".into(), "community".into());

        let value = build_search_filter(&filter).expect("filter");
        assert_eq!(
            value,
            json!({
                "must": [
                    { "key": "category", "match": { "value": "community" } },
                    {
                        "should": [
                            { "is_null": { "key": "facilitator" } },
                            { "is_empty": { "key": "facilitator" } }
                        ]
                    },
                    { "key": "session_number", "match": { "value": 2 } }
                ]
            })
        );
    }

    #[test]
    fn null_constraint_also_matches_missing_keys() {
        use crate::store::{Metadata, matches_filter};

        let mut filter = MetadataFilter::new();
        filter.insert("session_number".into(), MetadataValue::Null);
        assert!(matches_filter(&Metadata::new(), &filter));

        let value = build_search_filter(&filter).expect("filter");
        let conditions = value["must"][0]["should"]
            .as_array()
            .expect("nested should");
        assert!(conditions.contains(&json!({ "is_null": { "key": "session_number" } })));
        assert!(conditions.contains(&json!({ "is_empty": { "key": "session_number" } })));
    }
}
