//! Remote content classification.
//!
//! [`OpenAIClassifier`] asks a chat-completions model to categorize a
//! capture and maps the reply through the core classification rules. The
//! classifier never fails: any problem (transport error, non-success
//! status, unparseable reply, no valid category) is logged and answered
//! with the rule-based fallback.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use synapse_core::classify::{
    ClassificationResult, ClassificationSource, Classifier, FallbackClassifier, Signals,
};
use synapse_core::classify::{build_prompt, parse_reply, SYSTEM_PROMPT};

use crate::config::{ClassifierConfig, ServiceCredentials};

/// Build the classifier selected by `config`.
///
/// An enabled provider without an API key degrades to the fallback
/// classifier with a warning.
pub fn create_classifier(
    config: &ClassifierConfig,
    credentials: &ServiceCredentials,
) -> Result<Arc<dyn Classifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(FallbackClassifier)),
        "openai" => match credentials.openai_api_key() {
            Some(key) => Ok(Arc::new(OpenAIClassifier::new(config, key)?)),
            None => {
                tracing::warn!("classifier provider is openai but no API key is set; using rule-based fallback");
                Ok(Arc::new(FallbackClassifier))
            }
        },
        other => bail!("Unknown classifier provider: {}", other),
    }
}

/// Classifier backed by the OpenAI chat completions API.
pub struct OpenAIClassifier {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    name: String,
    max_tokens: u32,
    temperature: f32,
    preview_chars: usize,
}

impl OpenAIClassifier {
    pub fn new(config: &ClassifierConfig, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: format!(
                "{}/chat/completions",
                config.api_base.trim_end_matches('/')
            ),
            model: config.model.clone(),
            name: format!("openai:{}", config.model),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            preview_chars: config.preview_chars,
        })
    }

    async fn request(&self, signals: &Signals) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(signals, self.preview_chars)},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl Classifier for OpenAIClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, signals: &Signals) -> ClassificationResult {
        let reply = match self.request(signals).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(classifier = %self.name, error = %err, "classification request failed; using fallback");
                return ClassificationResult::fallback(signals);
            }
        };

        match parse_reply(&reply).and_then(ClassificationResult::from_reply) {
            Some(result) => result,
            None => {
                tracing::info!(classifier = %self.name, "classifier reply had no usable category; using fallback");
                ClassificationResult::fallback(signals)
            }
        }
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}
