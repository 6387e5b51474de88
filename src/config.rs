//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, see [`load_or_default`]) yields a working configuration pointed at
//! the Gemini APIs. The resulting [`Config`] is passed explicitly to the
//! builder and the query service; nothing reads process-wide settings.
//!
//! ```toml
//! [index]
//! path = "data/vectors.json"
//!
//! [build]
//! root = "."
//! extensions = ["html", "htm", "md", "markdown"]
//! exclude_dirs = ["data", "node_modules", "target"]
//! on_embed_error = "abort"      # or "empty"
//!
//! [embedding]
//! provider = "gemini"           # gemini | openai | ollama | disabled
//! model = "text-embedding-004"
//! concurrency = 1
//!
//! [generation]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//!
//! [retrieval]
//! top_k = 5
//! diverse = false
//! max_context_chars = 6000
//! citation_markers = true
//! on_embed_error = "degrade"    # or "fail"
//!
//! [server]
//! bind = "127.0.0.1:8787"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use site_context_core::retrieve::{RetrievalParams, SelectionPolicy};
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config/site-context.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/vectors.json")
}

/// What the builder does when a chunk cannot be embedded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildEmbedFailure {
    /// Fail the whole build and keep the previous index.
    #[default]
    Abort,
    /// Store the chunk with an empty vector and carry on.
    Empty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BuildConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// File extensions (without dot, case-insensitive) treated as documents.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Directory names skipped anywhere in the tree. Hidden entries are
    /// always skipped.
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default)]
    pub on_embed_error: BuildEmbedFailure,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            on_embed_error: BuildEmbedFailure::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_extensions() -> Vec<String> {
    ["html", "htm", "md", "markdown"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_exclude_dirs() -> Vec<String> {
    ["data", "node_modules", "target"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name; each provider has its own default.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL; each provider has its own default.
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Embedding requests kept in flight during a build.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: None,
            timeout_secs: default_embed_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_generate_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Instruction placed before the context. An empty string disables it.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: None,
            timeout_secs: default_generate_timeout_secs(),
            max_retries: default_max_retries(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_generate_timeout_secs() -> u64 {
    60
}
fn default_system_prompt() -> Option<String> {
    Some(
        "You answer questions about this website and its author. \
         Ground your answer in the context below and cite sources as [#n]. \
         If the context does not cover the question, say so."
            .to_string(),
    )
}

/// What the query service does when the query cannot be embedded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryEmbedFailure {
    /// Answer without context.
    #[default]
    Degrade,
    /// Reject the request.
    Fail,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// At most one chunk per source group.
    #[serde(default)]
    pub diverse: bool,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_true")]
    pub citation_markers: bool,
    #[serde(default)]
    pub on_embed_error: QueryEmbedFailure,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            diverse: false,
            max_context_chars: default_max_context_chars(),
            citation_markers: true,
            on_embed_error: QueryEmbedFailure::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            policy: if self.diverse {
                SelectionPolicy::GroupDiverse
            } else {
                SelectionPolicy::TopK
            },
            max_context_chars: self.max_context_chars,
            citation_markers: self.citation_markers,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_context_chars() -> usize {
    6000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_max_message_chars() -> usize {
    4000
}

const PROVIDERS: &[&str] = &["disabled", "gemini", "openai", "ollama"];

impl Config {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.max_context_chars == 0 {
            bail!("retrieval.max_context_chars must be >= 1");
        }
        if self.embedding.concurrency == 0 {
            bail!("embedding.concurrency must be >= 1");
        }
        if self.server.max_message_chars == 0 {
            bail!("server.max_message_chars must be >= 1");
        }
        if self.build.extensions.is_empty() {
            bail!("build.extensions must list at least one extension");
        }

        for (section, provider) in [
            ("embedding", &self.embedding.provider),
            ("generation", &self.generation.provider),
        ] {
            if !PROVIDERS.contains(&provider.as_str()) {
                bail!(
                    "Unknown {} provider: '{}'. Must be one of: {}.",
                    section,
                    provider,
                    PROVIDERS.join(", ")
                );
            }
        }

        Ok(())
    }

    /// The system prompt, or `None` when unset or blank.
    pub fn system_prompt(&self) -> Option<&str> {
        self.generation
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path`, falling back to built-in defaults when the default path is
/// absent. An explicitly given path must exist.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}
