//! HTTP client wrapper for interacting with Qdrant, and its [`VectorStore`] implementation.

use crate::qdrant::{
    filters::build_search_filter,
    payload::{build_payload, record_from_payload, stringify_point_id},
    types::{
        CollectionInfoResponse, QdrantError, QueryResponse, QueryResponseResult, ScrollResponse,
    },
};
use crate::store::{
    EmbeddedRecord, IndexManifest, MetadataFilter, ScoredRecord, StoreError, StoredRecord,
    VectorStore, check_dimensions,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

const SCROLL_PAGE_SIZE: usize = 512;

/// Payload fields indexed for filtering, with their Qdrant schema.
const PAYLOAD_INDEXES: [(&str, &str); 5] = [
    ("source_file", "keyword"),
    ("category", "keyword"),
    ("content_type", "keyword"),
    ("facilitator", "keyword"),
    ("session_number", "integer"),
];

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("course-index/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Vector size of `collection`, or `None` when it does not exist.
    pub async fn collection_dimension(
        &self,
        collection: &str,
    ) -> Result<Option<usize>, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let info: CollectionInfoResponse = response.json().await?;
                Ok(Some(info.result.config.params.vectors.size))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection, error = %error, "Collection lookup failed");
                Err(error)
            }
        }
    }

    /// Create a cosine-distance collection with the given vector size.
    pub async fn create_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection, vector_size, "Collection created");
        })
        .await
    }

    /// Ensure payload indexes exist for the filterable metadata fields.
    pub async fn ensure_payload_indexes(&self, collection: &str) -> Result<(), QdrantError> {
        for (field, schema) in PAYLOAD_INDEXES {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection}/index"))?
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() || status == StatusCode::CONFLICT {
                tracing::debug!(collection, field, schema, "Payload index ensured");
            } else {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection, field, schema, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }

    /// Upload points and wait until they are persisted.
    pub async fn upsert_points(
        &self,
        collection: &str,
        records: &[EmbeddedRecord],
    ) -> Result<(), QdrantError> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.vector,
                    "payload": build_payload(record),
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection}/points"))?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection, points = point_count, "Points upserted");
        })
        .await
    }

    /// Similarity query returning scored records.
    pub async fn query_points(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<Value>,
    ) -> Result<Vec<ScoredRecord>, QdrantError> {
        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let (Some(filter), Some(object)) = (filter, body.as_object_mut()) {
            object.insert("filter".into(), filter);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| ScoredRecord {
                record: record_from_payload(
                    stringify_point_id(point.id),
                    point.payload.unwrap_or_default(),
                ),
                score: point.score,
            })
            .collect())
    }

    /// Page through every point in `collection`.
    pub async fn scroll_records(&self, collection: &str) -> Result<Vec<StoredRecord>, QdrantError> {
        let mut offset: Option<Value> = None;
        let mut records = Vec::new();

        loop {
            let mut body = json!({
                "with_payload": true,
                "with_vector": false,
                "limit": SCROLL_PAGE_SIZE,
            });
            if let (Some(next), Some(object)) = (offset.take(), body.as_object_mut()) {
                object.insert("offset".into(), next);
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{collection}/points/scroll"),
                )?
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection, error = %error, "Failed to scroll points");
                return Err(error);
            }

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let (Some(id), Some(payload)) = (point.id, point.payload) {
                    records.push(record_from_payload(stringify_point_id(id), payload));
                }
            }

            match result.next_page_offset {
                Some(Value::Null) | None => break,
                Some(next) => offset = Some(next),
            }
        }

        Ok(records)
    }

    /// Drop `collection`; a missing collection is not an error.
    pub async fn delete_collection(&self, collection: &str) -> Result<(), QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection}"))?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(collection, "Collection already absent");
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::info!(collection, "Collection deleted");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantService {
    async fn initialize(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        records: Vec<EmbeddedRecord>,
    ) -> Result<(), StoreError> {
        match self.collection_dimension(collection).await? {
            Some(existing) if existing != manifest.dimension => {
                return Err(StoreError::DimensionMismatch {
                    expected: existing,
                    actual: manifest.dimension,
                });
            }
            Some(_) => {
                tracing::warn!(collection, "Collection exists; new records will be added to it");
            }
            None => self.create_collection(collection, manifest.dimension).await?,
        }
        self.ensure_payload_indexes(collection).await?;
        check_dimensions(manifest.dimension, &records)?;
        self.upsert_points(collection, &records).await?;
        Ok(())
    }

    async fn append(
        &self,
        collection: &str,
        records: Vec<EmbeddedRecord>,
    ) -> Result<(), StoreError> {
        let dimension = self
            .collection_dimension(collection)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        check_dimensions(dimension, &records)?;
        self.upsert_points(collection, &records).await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let hits = self
            .query_points(collection, vector, limit, build_search_filter(filter))
            .await?;
        Ok(hits)
    }

    // Qdrant keeps the vector size but not the model, so the manifest never names one.
    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>, StoreError> {
        let dimension = self.collection_dimension(collection).await?;
        Ok(dimension.map(|dimension| IndexManifest {
            embedding_model: None,
            dimension,
            created_at: None,
        }))
    }

    async fn records(&self, collection: &str) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.scroll_records(collection).await?)
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        Ok(QdrantService::delete_collection(self, collection).await?)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Metadata, MetadataValue};
    use httpmock::{Method::DELETE, Method::GET, Method::POST, Method::PUT, MockServer};

    fn service(server: &MockServer) -> QdrantService {
        QdrantService::new(&server.base_url(), Some("secret".into())).expect("client")
    }

    fn record(id: &str, vector: Vec<f32>) -> EmbeddedRecord {
        let mut metadata = Metadata::new();
        metadata.insert("session_number".into(), 3u32.into());
        EmbeddedRecord {
            id: id.into(),
            content: "Body".into(),
            metadata,
            vector,
        }
    }

    fn collection_info(size: usize) -> Value {
        json!({
            "status": "ok",
            "result": { "config": { "params": { "vectors": { "size": size, "distance": "Cosine" } } } }
        })
    }

    #[tokio::test]
    async fn search_sends_filter_and_maps_payloads() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/course/points/query")
                    .header("api-key", "secret")
                    .json_body_partial(
                        r#"{"filter":{"must":[{"key":"session_number","match":{"value":3}}]}}"#,
                    );
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": { "points": [
                        { "id": "p-1", "score": 0.9, "payload": { "content": "Body", "session_number": 3 } }
                    ] }
                }));
            })
            .await;

        let mut filter = MetadataFilter::new();
        filter.insert("session_number".into(), 3u32.into());
        let hits = service(&server)
            .search("course", &[0.1, 0.2], 4, &filter)
            .await
            .expect("search");

        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "p-1");
        assert_eq!(hits[0].record.content, "Body");
        assert_eq!(hits[0].record.metadata["session_number"], MetadataValue::Int(3));
    }

    #[tokio::test]
    async fn initialize_creates_missing_collection_and_upserts() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/course");
                then.status(404).body("not found");
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/course")
                    .json_body_partial(r#"{"vectors":{"size":2,"distance":"Cosine"}}"#);
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let indexes = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/course/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/course/points")
                    .query_param("wait", "true");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let manifest = IndexManifest {
            embedding_model: Some("hash".into()),
            dimension: 2,
            created_at: None,
        };
        service(&server)
            .initialize("course", &manifest, vec![record("a", vec![1.0, 0.0])])
            .await
            .expect("initialize");

        lookup.assert_async().await;
        create.assert_async().await;
        indexes.assert_hits_async(PAYLOAD_INDEXES.len()).await;
        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn initialize_rejects_a_collection_of_another_size() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/course");
                then.status(200).json_body(collection_info(8));
            })
            .await;

        let manifest = IndexManifest {
            embedding_model: None,
            dimension: 2,
            created_at: None,
        };
        let error = service(&server)
            .initialize("course", &manifest, vec![record("a", vec![1.0, 0.0])])
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            StoreError::DimensionMismatch {
                expected: 8,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn rate_limited_upserts_are_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/course");
                then.status(200).json_body(collection_info(2));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/course/points");
                then.status(429).body("slow down");
            })
            .await;

        let error = service(&server)
            .append("course", vec![record("a", vec![1.0, 0.0])])
            .await
            .expect_err("rate limited");
        assert!(error.is_rate_limited());
    }

    #[tokio::test]
    async fn records_follow_scroll_pages() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/course/points/scroll")
                    .json_body_partial(r#"{"offset":"p-2"}"#);
                then.status(200).json_body(json!({
                    "result": { "points": [ { "id": "p-2", "payload": { "content": "Two" } } ],
                                "next_page_offset": null }
                }));
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/course/points/scroll");
                then.status(200).json_body(json!({
                    "result": { "points": [ { "id": 1, "payload": { "content": "One" } } ],
                                "next_page_offset": "p-2" }
                }));
            })
            .await;

        let records = service(&server).records("course").await.expect("records");
        second.assert_async().await;
        first.assert_async().await;
        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "p-2"]);
    }

    #[tokio::test]
    async fn deleting_a_missing_collection_succeeds() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/course");
                then.status(404).body("missing");
            })
            .await;
        VectorStore::delete_collection(&service(&server), "course")
            .await
            .expect("idempotent delete");
    }
}
