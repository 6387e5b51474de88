//! Index build pipeline.
//!
//! Coordinates the full offline flow: document scan → chunking → one
//! embedding request per chunk → a single atomic write of the index file.
//! The builder is the only writer of the index and never runs on the query
//! path.

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use site_context_core::chunk::chunk_document;
use site_context_core::embedding::Embedder;
use site_context_core::index::Index;
use site_context_core::models::{Chunk, DocumentChunk};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{BuildEmbedFailure, Config};
use crate::documents::scan_documents;
use crate::embedding::{create_embedder, DisabledEmbedder};
use crate::progress::{BuildProgressEvent, BuildProgressReporter, ProgressMode};
use crate::store::save_index;

/// Where to read documents from and where to write the index.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub root: PathBuf,
    pub output: PathBuf,
    /// Walk and chunk only; no embedding, no write.
    pub dry_run: bool,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.build.root.clone(),
            output: config.index.path.clone(),
            dry_run: false,
        }
    }
}

/// Summary of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks stored with a usable embedding.
    pub embedded: usize,
    /// Chunks stored with an empty embedding (only with `on_embed_error = "empty"`).
    pub degraded: usize,
    /// Index file written, `None` for dry runs.
    pub output: Option<PathBuf>,
}

/// Build the index and write it to `options.output`.
///
/// With [`BuildEmbedFailure::Abort`] the first failed embedding returns an
/// error before anything is written, leaving any previous index in place.
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
    options: &BuildOptions,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport> {
    let documents = scan_documents(&options.root, &config.build)?;

    let chunked: Vec<(String, Vec<DocumentChunk>)> = documents
        .iter()
        .map(|doc| (doc.path.clone(), chunk_document(&doc.text, &doc.path, doc.kind)))
        .collect();
    let total_chunks: usize = chunked.iter().map(|(_, pieces)| pieces.len()).sum();

    info!(
        root = %options.root.display(),
        documents = documents.len(),
        chunks = total_chunks,
        "scanned documents"
    );
    progress.report(BuildProgressEvent::Discovered {
        documents: documents.len() as u64,
        chunks: total_chunks as u64,
    });

    if options.dry_run {
        return Ok(BuildReport {
            documents: documents.len(),
            chunks: total_chunks,
            embedded: 0,
            degraded: 0,
            output: None,
        });
    }

    let concurrency = config.embedding.concurrency.max(1);
    let total_docs = chunked.len() as u64;
    let mut chunks = Vec::with_capacity(total_chunks);
    let mut degraded = 0usize;

    for (n, (path, pieces)) in chunked.into_iter().enumerate() {
        // `buffered` yields results in input order regardless of completion order.
        let vectors: Vec<Result<Vec<f32>>> = stream::iter(pieces.iter().map(|p| embedder.embed(&p.text)))
            .buffered(concurrency)
            .collect()
            .await;

        for (piece, result) in pieces.into_iter().zip(vectors) {
            let embedding = match result {
                Ok(vector) if !vector.is_empty() => vector,
                outcome => {
                    let reason = match outcome {
                        Err(e) => format!("{:#}", e),
                        Ok(_) => "empty embedding".to_string(),
                    };
                    match config.build.on_embed_error {
                        BuildEmbedFailure::Abort => bail!(
                            "Failed to embed chunk {}: {} (index left unchanged)",
                            piece.source,
                            reason
                        ),
                        BuildEmbedFailure::Empty => {
                            warn!(source = %piece.source, %reason, "storing chunk without embedding");
                            degraded += 1;
                            Vec::new()
                        }
                    }
                }
            };
            debug!(source = %piece.source, dims = embedding.len(), "embedded chunk");
            chunks.push(Chunk::new(piece, embedding));
        }

        progress.report(BuildProgressEvent::Embedding {
            document: path,
            n: n as u64 + 1,
            total: total_docs,
        });
    }

    let index = Index::new(Some(embedder.model_name().to_string()), chunks);
    save_index(&index, &options.output)?;

    info!(
        output = %options.output.display(),
        chunks = index.len(),
        degraded,
        "index written"
    );

    Ok(BuildReport {
        documents: documents.len(),
        chunks: index.len(),
        embedded: index.len() - degraded,
        degraded,
        output: Some(options.output.clone()),
    })
}

/// CLI entry point for `site-ctx build`.
pub async fn run_build(
    config: &Config,
    root: Option<PathBuf>,
    output: Option<PathBuf>,
    dry_run: bool,
    progress: Option<ProgressMode>,
) -> Result<()> {
    let mut options = BuildOptions::from_config(config);
    if let Some(root) = root {
        options.root = root;
    }
    if let Some(output) = output {
        options.output = output;
    }
    options.dry_run = dry_run;

    let embedder: Arc<dyn Embedder> = if dry_run {
        Arc::new(DisabledEmbedder)
    } else {
        create_embedder(&config.embedding)?
    };
    let reporter = progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    let report = build_index(config, embedder.as_ref(), &options, reporter.as_ref()).await?;

    if dry_run {
        println!("build (dry-run)");
        println!("  documents found: {}", report.documents);
        println!("  chunks: {}", report.chunks);
        return Ok(());
    }

    println!("build");
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  embedded: {}", report.embedded);
    if report.degraded > 0 {
        println!("  without embedding: {}", report.degraded);
    }
    println!("  index: {}", options.output.display());
    println!("ok");

    Ok(())
}
