//! CLI query commands: `site-ctx search` and `site-ctx ask`.
//!
//! `search` runs retrieval only and prints the ranked citations followed by
//! the exact context a generator would receive. `ask` runs the full query
//! service and prints the answer with its sources.

use anyhow::Result;
use site_context_core::models::Citation;
use std::sync::Arc;

use crate::config::{Config, QueryEmbedFailure};
use crate::embedding::create_embedder;
use crate::generation::DisabledGenerator;
use crate::service::QueryService;
use crate::store::load_index;

/// Run retrieval for `query` against the configured index.
///
/// Unlike the chat path, a missing index or a failed query embedding is an
/// error here.
pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    diverse: bool,
) -> Result<()> {
    let index = load_index(&config.index.path)?;

    let mut config = config.clone();
    config.retrieval.on_embed_error = QueryEmbedFailure::Fail;
    if let Some(k) = top_k {
        config.retrieval.top_k = k;
    }
    if diverse {
        config.retrieval.diverse = true;
    }

    let embedder = create_embedder(&config.embedding)?;
    let service = QueryService::new(&config, embedder, Arc::new(DisabledGenerator), Some(index));
    let retrieval = service.search(query).await?;

    if retrieval.is_empty() {
        println!("No results.");
        return Ok(());
    }

    print_citations(&retrieval.citations);
    println!("--- context ({} chars) ---", retrieval.context.chars().count());
    println!("{}", retrieval.context);

    Ok(())
}

/// Answer `question` the same way the chat endpoint does.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let service = QueryService::from_config(config)?;
    let answer = service.ask(question).await?;

    println!("{}", answer.answer.trim_end());
    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        print_citations(&answer.citations);
    }

    Ok(())
}

fn print_citations(citations: &[Citation]) {
    for (i, citation) in citations.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} / {}",
            i + 1,
            citation.score,
            citation.source,
            citation.label.as_deref().unwrap_or("(untitled)")
        );
    }
}
