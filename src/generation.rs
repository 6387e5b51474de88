//! Generation providers.
//!
//! Concrete implementations of the core [`Generator`] trait. The prompt is
//! sent as a single user turn; the reply text is returned verbatim.

use anyhow::{bail, Result};
use async_trait::async_trait;
use site_context_core::generation::Generator;
use std::sync::Arc;

use crate::client::{api_key_from_env, join_url, JsonClient};
use crate::config::GenerationConfig;
use crate::embedding::{GEMINI_KEY_ENV, GEMINI_URL, OLLAMA_URL, OPENAI_KEY_ENV, OPENAI_URL};

pub const GEMINI_GENERATE_MODEL: &str = "gemini-2.5-flash";
pub const OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";
pub const OLLAMA_GENERATE_MODEL: &str = "llama3.2";

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.provider.as_str() {
        "gemini" => Arc::new(GeminiGenerator::new(config)?),
        "openai" => Arc::new(OpenAIGenerator::new(config)?),
        "ollama" => Arc::new(OllamaGenerator::new(config)?),
        "disabled" => Arc::new(DisabledGenerator),
        other => bail!("Unknown generation provider: {}", other),
    };
    Ok(generator)
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    client: JsonClient,
    model: String,
    url: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or(GEMINI_KEY_ENV);
        Ok(Self {
            client: JsonClient::new("Gemini", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_GENERATE_MODEL.to_string()),
            url: config.url.clone().unwrap_or_else(|| GEMINI_URL.to_string()),
            api_key: api_key_from_env(key_env)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = join_url(
            &self.url,
            &format!("v1beta/models/{}:generateContent", self.model),
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        let json = self
            .client
            .post_json(&url, &[("x-goog-api-key", self.api_key.clone())], &body)
            .await?;
        parse_gemini_response(&json)
    }
}

/// Concatenate `candidates[0].content.parts[].text`.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    non_empty(text, "Gemini")
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    client: JsonClient,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let key_env = config.api_key_env.as_deref().unwrap_or(OPENAI_KEY_ENV);
        Ok(Self {
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_MODEL.to_string()),
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key: api_key_from_env(key_env)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let json = self
            .client
            .post_json(
                &join_url(&self.url, "v1/chat/completions"),
                &[("Authorization", format!("Bearer {}", self.api_key))],
                &body,
            )
            .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
    non_empty(text.to_string(), "OpenAI")
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: JsonClient,
    model: String,
    url: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_GENERATE_MODEL.to_string()),
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let json = self
            .client
            .post_json(&join_url(&self.url, "api/generate"), &[], &body)
            .await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))?;
        non_empty(text.to_string(), "Ollama")
    }
}

fn non_empty(text: String, service: &str) -> Result<String> {
    if text.trim().is_empty() {
        bail!("{} returned an empty answer", service);
    }
    Ok(text)
}
