//! OpenAI-compatible embeddings client.
//!
//! Calls `POST {base_url}/embeddings` with one input per request. Transient
//! failures (HTTP 429, 5xx, network errors) are retried with exponential
//! backoff: 1s, 2s, 4s, ... capped at 32s. Other 4xx responses fail at once.
//! Each attempt is limited to an equal share of the configured timeout.

use std::time::Duration;

use askdesk_core::{EmbeddingConfig, Error, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::embedder::{truncate_chars, Embedder};

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dim: usize,
    max_retries: usize,
    max_input_chars: usize,
}

impl OpenAiEmbedder {
    /// Build a client from configuration. Fails if no API key is configured.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("OPENAI_API_KEY is required for the openai embedder".into())
            })?;

        let client = reqwest::Client::builder()
            .timeout(attempt_timeout(config.timeout(), config.max_retries))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dim: config.dimension,
            max_retries: config.max_retries,
            max_input_chars: config.max_input_chars,
        })
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
            "dimensions": self.dim,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!("Embedding retry {} after {:?}", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let json: serde_json::Value = resp.json().await.map_err(|e| {
                            Error::Provider(format!("invalid embeddings response: {}", e))
                        })?;
                        return parse_embedding_response(&json, self.dim);
                    }

                    let text = resp.text().await.unwrap_or_default();
                    let err = Error::Provider(format!("embeddings API error {}: {}", status, text));
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!("Embedding attempt {} failed: {}", attempt + 1, status);
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    warn!("Embedding attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(Error::Provider(e.to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider("embedding failed after retries".into())))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(truncate_chars(text, self.max_input_chars)).await
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Per-request timeout: the total budget split across every attempt, at least 1s.
pub fn attempt_timeout(total: Duration, max_retries: usize) -> Duration {
    let attempts = u32::try_from(max_retries.saturating_add(1)).unwrap_or(u32::MAX);
    (total / attempts).max(Duration::from_secs(1)).min(total)
}

/// Extract `data[0].embedding` and check its length.
fn parse_embedding_response(json: &serde_json::Value, dim: usize) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::Provider("embeddings response missing data[0].embedding".into()))?;

    let vec: Vec<f32> = embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    if vec.len() != dim {
        return Err(Error::Provider(format!(
            "embedding dimension {} does not match configured {}",
            vec.len(),
            dim
        )));
    }
    Ok(vec)
}
