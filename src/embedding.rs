//! Embedding backends.
//!
//! Implements the core [`Embedder`] trait:
//! - **[`DisabledEmbedder`]**: always yields no vector; used when embeddings
//!   are not configured or no API key is available.
//! - **[`OpenAIEmbedder`]**: calls an OpenAI-compatible `/embeddings`
//!   endpoint with retry and backoff.
//!
//! Use [`create_embedder`] to pick one from configuration and credentials.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)
//!
//! A call that still fails is logged and reported as "no vector".

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use synapse_core::embedding::{DisabledEmbedder, Embedder};

use crate::config::{EmbeddingConfig, ServiceCredentials};

/// Build the embedder selected by `config`.
///
/// An enabled provider without an API key degrades to [`DisabledEmbedder`]
/// with a warning rather than failing startup.
pub fn create_embedder(
    config: &EmbeddingConfig,
    credentials: &ServiceCredentials,
) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => match credentials.openai_api_key() {
            Some(key) => Ok(Arc::new(OpenAIEmbedder::new(config, key)?)),
            None => {
                tracing::warn!("embedding provider is openai but no API key is set; semantic search disabled");
                Ok(Arc::new(DisabledEmbedder))
            }
        },
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedder backed by the OpenAI embeddings API.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_input_chars: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: format!("{}/embeddings", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            max_input_chars: config.max_input_chars,
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let input: String = text.chars().take(self.max_input_chars).collect();
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.request(text).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                tracing::warn!(model = %self.model, error = %err, "embedding request failed");
                None
            }
        }
    }
}

/// Extract the first `data[].embedding` array from an embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|data| data.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

    if embedding.is_empty() {
        bail!("Invalid OpenAI response: empty embedding");
    }

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}
