//! TOML configuration and service credentials.
//!
//! Every section except `[db]` and `[server]` is optional and falls back to
//! the defaults below. [`load_config`] parses and validates the file.
//!
//! Credentials are not part of the file. [`ServiceCredentials`] is built
//! once at startup and handed to the components that call remote services.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use synapse_core::search::FusionParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,
    #[serde(default = "default_basic_limit")]
    pub basic_limit: usize,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_composite_max_chars")]
    pub composite_max_chars: usize,
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            final_limit: default_final_limit(),
            semantic_top_k: default_semantic_top_k(),
            basic_limit: default_basic_limit(),
            fuzzy_threshold: default_fuzzy_threshold(),
            composite_max_chars: default_composite_max_chars(),
            embed_concurrency: default_embed_concurrency(),
            embed_timeout_ms: default_embed_timeout_ms(),
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

impl RetrievalConfig {
    pub fn fusion_params(&self) -> FusionParams {
        FusionParams {
            final_limit: self.final_limit,
            semantic_top_k: self.semantic_top_k,
            basic_limit: self.basic_limit,
            ..FusionParams::default()
        }
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

fn default_candidate_limit() -> usize {
    500
}
fn default_final_limit() -> usize {
    20
}
fn default_semantic_top_k() -> usize {
    20
}
fn default_basic_limit() -> usize {
    10
}
fn default_fuzzy_threshold() -> f64 {
    0.4
}
fn default_composite_max_chars() -> usize {
    1000
}
fn default_embed_concurrency() -> usize {
    8
}
fn default_embed_timeout_ms() -> u64 {
    10_000
}
fn default_request_deadline_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_embedding_model(),
            api_base: default_api_base(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            cache: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_classifier_model(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_true() -> bool {
    true
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.3
}
fn default_preview_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// API keys for remote services.
///
/// Remote clients receive their key from here and never read the
/// environment themselves.
#[derive(Clone, Default)]
pub struct ServiceCredentials {
    openai_api_key: Option<String>,
}

/// Value shipped in sample `.env` files; treated as no key.
const PLACEHOLDER_KEY: &str = "your-openai-api-key-here";

impl ServiceCredentials {
    /// Read `OPENAI_API_KEY`. Empty and placeholder values count as absent.
    pub fn from_env() -> Self {
        Self::with_openai_key(std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn with_openai_key(key: Option<String>) -> Self {
        let openai_api_key = key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_KEY);
        Self { openai_api_key }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if r.candidate_limit < 1 {
        anyhow::bail!("retrieval.candidate_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.fuzzy_threshold) {
        anyhow::bail!("retrieval.fuzzy_threshold must be in [0.0, 1.0]");
    }
    if r.embed_concurrency < 1 {
        anyhow::bail!("retrieval.embed_concurrency must be >= 1");
    }
    if r.embed_timeout_ms == 0 || r.request_deadline_ms == 0 {
        anyhow::bail!("retrieval.embed_timeout_ms and retrieval.request_deadline_ms must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    match config.classifier.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown classifier provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.timeout_secs == 0 || config.classifier.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs and classifier.timeout_secs must be > 0");
    }
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }
    Ok(())
}
