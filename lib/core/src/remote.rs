//! Remote embedding model reached over an OpenAI-compatible HTTP API.

use crate::embedder::EmbeddingProvider;
use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use crate::vector::Vector;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// `POST {base_url}/embeddings` client.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dim: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dim,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request_once(&self, texts: &[String]) -> Result<Vec<Vector>, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "input": texts,
        });
        // Only the v3 family accepts a requested output size
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = json!(self.dim);
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!("Embedding {} text(s) with {} via {}", texts.len(), self.model, url);

        let call = async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Api { status, body });
            }

            let parsed: EmbeddingResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()))?;
            Ok(parsed)
        };

        let parsed = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))??;

        self.collect_vectors(parsed, texts.len())
    }

    fn collect_vectors(
        &self,
        response: EmbeddingResponse,
        expected: usize,
    ) -> Result<Vec<Vector>, ProviderError> {
        if response.data.len() != expected {
            return Err(ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                expected,
                response.data.len()
            )));
        }

        let mut slots: Vec<Option<Vector>> = vec![None; expected];
        for datum in response.data {
            if datum.embedding.len() != self.dim {
                return Err(ProviderError::Malformed(format!(
                    "embedding {} has dimension {}, expected {}",
                    datum.index,
                    datum.embedding.len(),
                    self.dim
                )));
            }
            if datum.embedding.iter().any(|x| !x.is_finite()) {
                return Err(ProviderError::Malformed(format!(
                    "embedding {} has non-finite components",
                    datum.index
                )));
            }
            let slot = slots.get_mut(datum.index).ok_or_else(|| {
                ProviderError::Malformed(format!("embedding index {} out of range", datum.index))
            })?;
            *slot = Some(Vector::new(datum.embedding));
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| ProviderError::Malformed(format!("embedding {} missing", i))))
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.retry
            .run(
                "embedding request",
                || self.request_once(texts),
                ProviderError::is_retryable,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiEmbeddings {
        OpenAiEmbeddings::new("key", "text-embedding-3-small", 2)
    }

    #[test]
    fn test_collect_vectors_reorders_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        }))
        .unwrap();

        let vectors = provider().collect_vectors(response, 2).unwrap();
        assert_eq!(vectors[0].as_slice(), &[1.0, 0.0]);
        assert_eq!(vectors[1].as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn test_collect_vectors_rejects_bad_shapes() {
        let short: EmbeddingResponse =
            serde_json::from_value(json!({"data": [{"index": 0, "embedding": [1.0, 0.0]}]})).unwrap();
        assert!(matches!(
            provider().collect_vectors(short, 2),
            Err(ProviderError::Malformed(_))
        ));

        let wrong_dim: EmbeddingResponse =
            serde_json::from_value(json!({"data": [{"index": 0, "embedding": [1.0]}]})).unwrap();
        assert!(matches!(
            provider().collect_vectors(wrong_dim, 1),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_collect_vectors_rejects_overflowing_components() {
        // 1e39 does not fit in an f32 and parses as infinity
        let overflow: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1e39, 0.0]}]}"#).unwrap();
        assert!(matches!(
            provider().collect_vectors(overflow, 1),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let p = provider().with_base_url("http://localhost:8080/v1/");
        assert_eq!(p.base_url, "http://localhost:8080/v1");
    }
}
