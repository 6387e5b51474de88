//! Query service: validate → embed → retrieve → prompt → generate.
//!
//! Holds the loaded index behind an `Arc` and the two collaborators. One
//! instance is shared by every HTTP handler; it has no interior mutability.

use serde::Serialize;
use site_context_core::embedding::Embedder;
use site_context_core::generation::Generator;
use site_context_core::index::Index;
use site_context_core::models::{Citation, Retrieval};
use site_context_core::retrieve::{retrieve, RetrievalParams};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, QueryEmbedFailure};
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::store::load_index;

/// Errors surfaced to callers of the query service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The message was rejected before any work was done.
    #[error("{0}")]
    Input(String),
    #[error("query embedding failed: {0}")]
    Embedding(String),
    #[error("answer generation failed: {0}")]
    Generation(String),
}

/// A generated answer and the chunks that grounded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    index: Option<Arc<Index>>,
    params: RetrievalParams,
    on_embed_error: QueryEmbedFailure,
    system_prompt: Option<String>,
    max_message_chars: usize,
}

impl QueryService {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Option<Index>,
    ) -> Self {
        Self {
            embedder,
            generator,
            index: index.map(Arc::new),
            params: config.retrieval.params(),
            on_embed_error: config.retrieval.on_embed_error,
            system_prompt: config.system_prompt().map(str::to_string),
            max_message_chars: config.server.max_message_chars,
        }
    }

    /// Create providers from config and load the index.
    ///
    /// An index that cannot be loaded is logged and treated as absent;
    /// queries then run without context.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;

        let index = match load_index(&config.index.path) {
            Ok(index) => {
                info!(
                    path = %config.index.path.display(),
                    chunks = index.len(),
                    model = index.model.as_deref().unwrap_or("unknown"),
                    "index loaded"
                );
                if let Some(model) = index.model.as_deref() {
                    if model != embedder.model_name() {
                        warn!(
                            index_model = model,
                            query_model = embedder.model_name(),
                            "index was built with a different embedding model"
                        );
                    }
                }
                Some(index)
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "index unavailable; answers will not be grounded");
                None
            }
        };

        Ok(Self::new(config, embedder, generator, index))
    }

    /// Override the retrieval parameters taken from config.
    pub fn with_params(mut self, params: RetrievalParams) -> Self {
        self.params = params;
        self
    }

    pub fn index(&self) -> Option<&Index> {
        self.index.as_deref()
    }

    /// Chunks in the loaded index, 0 when none is loaded.
    pub fn chunk_count(&self) -> usize {
        self.index.as_ref().map_or(0, |index| index.len())
    }

    /// Trim the message and check it is non-empty and within the length limit.
    pub fn validate_message<'a>(&self, message: &'a str) -> Result<&'a str, ServiceError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::Input("message must not be empty".to_string()));
        }
        let chars = message.chars().count();
        if chars > self.max_message_chars {
            return Err(ServiceError::Input(format!(
                "message is too long ({} characters, limit {})",
                chars, self.max_message_chars
            )));
        }
        Ok(message)
    }

    /// The retrieval half of [`ask`](Self::ask): context and citations only.
    pub async fn search(&self, message: &str) -> Result<Retrieval, ServiceError> {
        let message = self.validate_message(message)?;
        self.retrieve(message).await
    }

    /// Answer a visitor message, grounded in the index when possible.
    pub async fn ask(&self, message: &str) -> Result<Answer, ServiceError> {
        let message = self.validate_message(message)?;
        let retrieval = self.retrieve(message).await?;

        let prompt = build_prompt(self.system_prompt.as_deref(), &retrieval.context, message);
        debug!(prompt_chars = prompt.chars().count(), "generating answer");

        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| ServiceError::Generation(format!("{:#}", e)))?;

        info!(citations = retrieval.citations.len(), "answered query");

        Ok(Answer {
            answer,
            citations: retrieval.citations,
        })
    }

    async fn retrieve(&self, message: &str) -> Result<Retrieval, ServiceError> {
        let Some(index) = self.index.as_deref() else {
            warn!("no index loaded; continuing without context");
            return Ok(Retrieval::default());
        };
        if index.is_empty() {
            return Ok(Retrieval::default());
        }

        let query = match self.embedder.embed(message).await {
            Ok(vector) if !vector.is_empty() => vector,
            outcome => {
                let reason = match outcome {
                    Err(e) => format!("{:#}", e),
                    Ok(_) => "empty embedding".to_string(),
                };
                return match self.on_embed_error {
                    QueryEmbedFailure::Fail => Err(ServiceError::Embedding(reason)),
                    QueryEmbedFailure::Degrade => {
                        warn!(%reason, "query embedding failed; continuing without context");
                        Ok(Retrieval::default())
                    }
                };
            }
        };

        if let Some(dims) = index.dims {
            if dims != query.len() {
                warn!(
                    index_dims = dims,
                    query_dims = query.len(),
                    "query vector length differs from index"
                );
            }
        }

        Ok(retrieve(&query, &index.chunks, &self.params))
    }
}

/// System prompt, context and message joined by blank lines, empty parts
/// left out.
pub fn build_prompt(system: Option<&str>, context: &str, message: &str) -> String {
    [system.unwrap_or(""), context, message]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use site_context_core::models::Chunk;
    use std::sync::Mutex;

    /// Two-dimensional vectors: "alpha" points one way, "beta" the other.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(vec![
                text.matches("alpha").count() as f32,
                text.matches("beta").count() as f32,
            ])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            bail!("service unavailable")
        }
    }

    /// Records the prompt and answers with a fixed string.
    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("generated answer".to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            bail!("quota exceeded")
        }
    }

    fn chunk(text: &str, source: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: site_context_core::chunk::fingerprint(text),
            text: text.to_string(),
            source: source.to_string(),
            label: None,
            embedding,
        }
    }

    fn index() -> Index {
        Index::new(
            Some("keyword".to_string()),
            vec![
                chunk("Alpha content", "docs/a.md", vec![1.0, 0.0]),
                chunk("Beta content", "docs/b.md", vec![0.0, 1.0]),
            ],
        )
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.retrieval.top_k = 1;
        config.retrieval.citation_markers = false;
        config.generation.system_prompt = Some("Be brief.".to_string());
        config.server.max_message_chars = 20;
        config
    }

    #[tokio::test]
    async fn test_ask_grounds_prompt() {
        let generator = Arc::new(RecordingGenerator::default());
        let service = QueryService::new(
            &config(),
            Arc::new(KeywordEmbedder),
            generator.clone(),
            Some(index()),
        );

        let answer = service.ask("  tell me alpha ").await.unwrap();
        assert_eq!(answer.answer, "generated answer");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source, "docs/a.md");
        assert_eq!(
            generator.last_prompt(),
            "Be brief.\n\nAlpha content\n\ntell me alpha"
        );
    }

    #[tokio::test]
    async fn test_rejects_empty_and_long_messages() {
        let service = QueryService::new(
            &config(),
            Arc::new(KeywordEmbedder),
            Arc::new(RecordingGenerator::default()),
            Some(index()),
        );
        assert!(matches!(service.ask("   ").await, Err(ServiceError::Input(_))));
        assert!(matches!(
            service.ask(&"x".repeat(21)).await,
            Err(ServiceError::Input(_))
        ));
        assert!(service.ask(&"x".repeat(20)).await.is_ok());
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let generator = Arc::new(RecordingGenerator::default());
        let service = QueryService::new(
            &config(),
            Arc::new(FailingEmbedder),
            generator.clone(),
            Some(index()),
        );
        let answer = service.ask("alpha?").await.unwrap();
        assert!(answer.citations.is_empty());
        assert_eq!(generator.last_prompt(), "Be brief.\n\nalpha?");
    }

    #[tokio::test]
    async fn test_embedding_failure_can_fail() {
        let mut config = config();
        config.retrieval.on_embed_error = QueryEmbedFailure::Fail;
        let service = QueryService::new(
            &config,
            Arc::new(FailingEmbedder),
            Arc::new(RecordingGenerator::default()),
            Some(index()),
        );
        let err = service.ask("alpha?").await.unwrap_err();
        assert!(matches!(err, ServiceError::Embedding(_)));
        assert!(err.to_string().contains("service unavailable"));
    }

    #[tokio::test]
    async fn test_generation_failure() {
        let service = QueryService::new(
            &config(),
            Arc::new(KeywordEmbedder),
            Arc::new(FailingGenerator),
            Some(index()),
        );
        let err = service.ask("alpha?").await.unwrap_err();
        assert!(matches!(err, ServiceError::Generation(_)));
    }

    #[tokio::test]
    async fn test_missing_index_is_ungrounded() {
        let generator = Arc::new(RecordingGenerator::default());
        let service = QueryService::new(&config(), Arc::new(KeywordEmbedder), generator.clone(), None);
        let answer = service.ask("beta").await.unwrap();
        assert!(answer.citations.is_empty());
        assert_eq!(service.chunk_count(), 0);
        assert_eq!(generator.last_prompt(), "Be brief.\n\nbeta");
    }

    #[tokio::test]
    async fn test_search_with_param_override() {
        let service = QueryService::new(
            &config(),
            Arc::new(KeywordEmbedder),
            Arc::new(RecordingGenerator::default()),
            Some(index()),
        )
        .with_params(RetrievalParams {
            top_k: 2,
            ..RetrievalParams::default()
        });
        let retrieval = service.search("beta").await.unwrap();
        let sources: Vec<&str> = retrieval.citations.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["docs/b.md", "docs/a.md"]);
        assert!(retrieval.context.starts_with("[#1 • docs/b.md]\nBeta content"));
    }

    #[test]
    fn test_build_prompt_omits_empty_parts() {
        assert_eq!(build_prompt(Some("S"), "C", "M"), "S\n\nC\n\nM");
        assert_eq!(build_prompt(None, "C", "M"), "C\n\nM");
        assert_eq!(build_prompt(Some("S"), "", "M"), "S\n\nM");
        assert_eq!(build_prompt(None, "", "M"), "M");
    }
}
