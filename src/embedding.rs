//! Embedding providers.
//!
//! Concrete implementations of the core [`Embedder`] trait:
//! - **[`GeminiEmbedder`]**: `models/{model}:embedContent` on the Generative Language API.
//! - **[`OpenAIEmbedder`]**: the OpenAI `/v1/embeddings` endpoint.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//!
//! Each request embeds exactly one text. A successful response carrying an
//! empty vector is reported as an error so callers never store or score a
//! vector that cannot be compared.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use site_context::config::EmbeddingConfig;
//! # use site_context::embedding::create_embedder;
//! let mut config = EmbeddingConfig::default();
//! config.provider = "disabled".to_string();
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use site_context_core::embedding::Embedder;
use std::sync::Arc;

use crate::client::{api_key_from_env, join_url, JsonClient};
use crate::config::EmbeddingConfig;

pub const GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_EMBED_MODEL: &str = "text-embedding-004";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
pub const OPENAI_URL: &str = "https://api.openai.com";
pub const OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OLLAMA_URL: &str = "http://localhost:11434";
pub const OLLAMA_EMBED_MODEL: &str = "nomic-embed-text";

/// Instantiate the embedder named by `config.provider`.
///
/// # Errors
///
/// Unknown provider names, or a hosted provider whose API key variable is
/// unset.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "gemini" => Arc::new(GeminiEmbedder::new(config)?),
        "openai" => Arc::new(OpenAIEmbedder::new(config)?),
        "ollama" => Arc::new(OllamaEmbedder::new(config)?),
        "disabled" => Arc::new(DisabledEmbedder),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(embedder)
}

// ============ Disabled ============

/// Fails every request.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ Gemini ============

pub struct GeminiEmbedder {
    client: JsonClient,
    model: String,
    url: String,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or(GEMINI_KEY_ENV);
        Ok(Self {
            client: JsonClient::new("Gemini", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_EMBED_MODEL.to_string()),
            url: config.url.clone().unwrap_or_else(|| GEMINI_URL.to_string()),
            api_key: api_key_from_env(key_env)?,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = join_url(
            &self.url,
            &format!("v1beta/models/{}:embedContent", self.model),
        );
        let body = serde_json::json!({
            "content": { "parts": [{ "text": text }] },
        });
        let json = self
            .client
            .post_json(&url, &[("x-goog-api-key", self.api_key.clone())], &body)
            .await?;
        parse_gemini_response(&json)
    }
}

/// Extract `embedding.values`.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embedding.values"))?;
    to_vector(values, "Gemini")
}

// ============ OpenAI ============

pub struct OpenAIEmbedder {
    client: JsonClient,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or(OPENAI_KEY_ENV);
        Ok(Self {
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_EMBED_MODEL.to_string()),
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key: api_key_from_env(key_env)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = self
            .client
            .post_json(
                &join_url(&self.url, "v1/embeddings"),
                &[("Authorization", format!("Bearer {}", self.api_key))],
                &body,
            )
            .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("embedding"))
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;
    to_vector(embedding, "OpenAI")
}

// ============ Ollama ============

/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: JsonClient,
    model: String,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_EMBED_MODEL.to_string()),
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        let json = self
            .client
            .post_json(&join_url(&self.url, "api/embed"), &[], &body)
            .await?;
        parse_ollama_response(&json)
    }
}

/// Extract `embeddings[0]`.
fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.get(0))
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings[0]"))?;
    to_vector(embedding, "Ollama")
}

/// Convert a JSON number array into a non-empty `Vec<f32>`.
fn to_vector(value: &serde_json::Value, service: &str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid {} response: embedding is not an array", service))?;

    let vector = items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow::anyhow!("Invalid {} response: non-numeric value", service))
        })
        .collect::<Result<Vec<f32>>>()?;

    if vector.is_empty() {
        bail!("{} returned an empty embedding", service);
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_gemini() {
        let v = parse_gemini_response(&json!({"embedding": {"values": [0.5, -1.0]}})).unwrap();
        assert_eq!(v, vec![0.5, -1.0]);
    }

    #[test]
    fn test_parse_gemini_missing_values() {
        let err = parse_gemini_response(&json!({"error": {"code": 400}})).unwrap_err();
        assert!(err.to_string().contains("embedding.values"));
    }

    #[test]
    fn test_parse_openai() {
        let json = json!({"data": [{"index": 0, "embedding": [1.0, 2.0, 3.0]}]});
        assert_eq!(parse_openai_response(&json).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parse_ollama() {
        let json = json!({"model": "m", "embeddings": [[0.25, 0.75]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_empty_vector_is_error() {
        let err = parse_ollama_response(&json!({"embeddings": [[]]})).unwrap_err();
        assert!(err.to_string().contains("empty embedding"));
    }

    #[test]
    fn test_non_numeric_is_error() {
        assert!(parse_openai_response(&json!({"data": [{"embedding": ["x"]}]})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_embedder_errors() {
        let mut config = EmbeddingConfig::default();
        config.provider = "disabled".to_string();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert!(embedder.embed("hello").await.is_err());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = EmbeddingConfig::default();
        config.provider = "ollama".to_string();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), OLLAMA_EMBED_MODEL);
    }
}
