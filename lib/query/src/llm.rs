//! Language model boundary for natural language queries.

use async_trait::async_trait;
use hybrix_core::{ExtractionError, RetryPolicy};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// A model that answers a system + user prompt with a JSON object, as text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ExtractionError>;
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// `POST {base_url}/chat/completions` client in JSON-object mode.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: hybrix_core::remote::OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
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
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
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

    async fn request_once(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending extraction request to {} ({})", url, self.model);

        let call = async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .map_err(|e| ExtractionError::Request(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ExtractionError::Api { status, body });
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| ExtractionError::MalformedOutput("response has no message content".into()))
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))?
    }
}

fn is_transient(e: &ExtractionError) -> bool {
    match e {
        ExtractionError::Request(_) | ExtractionError::Timeout(_) => true,
        ExtractionError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        self.retry
            .run("extraction request", || self.request_once(system, user), is_transient)
            .await
    }
}

/// Model that always answers with the same output and remembers the last
/// prompt it saw. For offline use and tests.
pub struct StaticLanguageModel {
    model_id: String,
    output: String,
    last_prompt: Mutex<Option<(String, String)>>,
}

impl StaticLanguageModel {
    pub fn new(model_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            output: output.into(),
            last_prompt: Mutex::new(None),
        }
    }

    /// (system, user) of the most recent call
    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for StaticLanguageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<String, ExtractionError> {
        *self.last_prompt.lock() = Some((system.to_string(), user.to_string()));
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(is_transient(&ExtractionError::Timeout(Duration::from_secs(1))));
        assert!(is_transient(&ExtractionError::Api { status: 503, body: String::new() }));
        assert!(!is_transient(&ExtractionError::Api { status: 401, body: String::new() }));
        assert!(!is_transient(&ExtractionError::MalformedOutput("x".into())));
    }

    #[test]
    fn test_chat_response_shape() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"limit\": 1}"}}]
        }))
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"limit\": 1}"));
    }

    #[tokio::test]
    async fn test_static_model_records_prompt() {
        let model = StaticLanguageModel::new("stub", "{}");
        let out = model.complete_json("system", "user").await.unwrap();

        assert_eq!(out, "{}");
        assert_eq!(model.last_prompt(), Some(("system".to_string(), "user".to_string())));
    }
}
