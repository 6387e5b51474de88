//! Data types shared by the index builder and the retrieval engine.
//!
//! A document is split into [`DocumentChunk`]s by the chunker, each of which
//! becomes a persisted [`Chunk`] once its embedding is known. At query time
//! chunks are wrapped in [`ScoredChunk`]s and the selected ones are reported
//! back as [`Citation`]s.

use serde::{Deserialize, Serialize};

use crate::chunk::fingerprint;

/// One addressable region of a document, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Raw text of the region, markup included.
    pub text: String,
    /// Document path, optionally followed by `#anchor`.
    pub source: String,
    /// Display title: the region's heading or the file name.
    pub label: Option<String>,
}

/// A chunk as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// SHA-256 of `text`, lowercase hex.
    pub id: String,
    pub text: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Attach an embedding to a chunker output, deriving the id from its text.
    pub fn new(piece: DocumentChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: fingerprint(&piece.text),
            text: piece.text,
            source: piece.source,
            label: piece.label,
            embedding,
        }
    }
}

/// A chunk scored against one query. Never persisted.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f64,
    /// 1-based position in the ranked list.
    pub rank: usize,
}

/// Citation metadata for one chunk included in the assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub label: Option<String>,
    pub source: String,
    pub score: f64,
}

impl From<&ScoredChunk<'_>> for Citation {
    fn from(scored: &ScoredChunk<'_>) -> Self {
        Self {
            label: scored.chunk.label.clone(),
            source: scored.chunk.source.clone(),
            score: scored.score,
        }
    }
}

/// Output of the retrieval engine: the context block and its citations,
/// both in inclusion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Retrieval {
    pub context: String,
    pub citations: Vec<Citation>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}
