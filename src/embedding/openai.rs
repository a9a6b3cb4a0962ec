//! Client for OpenAI-compatible `/embeddings` endpoints.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Hosted embedding client authenticated with a bearer token.
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiClient {
    /// Construct a client posting to `<base_url>/embeddings`.
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        dimension: usize,
    ) -> Result<Self, EmbeddingClientError> {
        let client = Client::builder().user_agent("course-index/0.1").build()?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        tracing::debug!(endpoint = %endpoint, model = %model, "Initialized embedding client");
        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            dimension,
        })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Providers also signal throttling in the error body, sometimes under a non-429 status.
fn names_rate_limit(body: &str) -> bool {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return false;
    };
    [envelope.error.code, envelope.error.kind]
        .iter()
        .flatten()
        .any(|value| value.contains("rate_limit"))
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: &texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || names_rate_limit(&body) {
                tracing::warn!(
                    status = status.as_u16(),
                    ?retry_after,
                    "Embedding provider rate limited the request"
                );
                return Err(EmbeddingClientError::RateLimited { retry_after });
            }
            return Err(EmbeddingClientError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut payload: EmbeddingResponse = response.json().await?;
        if payload.data.len() != texts.len() {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                payload.data.len()
            )));
        }
        payload.data.sort_by_key(|item| item.index);

        let vectors: Vec<Vec<f32>> = payload
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect();
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected dimension {}, received {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vectors)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
