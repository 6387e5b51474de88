//! Retrieval engine: rank, select and assemble grounding context.
//!
//! Retrieval is a pure function of the query vector, the indexed chunks and
//! [`RetrievalParams`]. The calling application embeds the query and owns
//! the index; nothing here keeps state between calls.
//!
//! # Algorithm
//!
//! 1. Score every chunk with [`cosine_similarity`].
//! 2. Stable sort by score (desc); ties keep index order.
//! 3. Select up to `top_k` chunks with distinct ids, optionally at most one
//!    per [`group_key`].
//! 4. Append selected chunks to the context until the next one would push
//!    it past `max_context_chars`; that chunk and everything after it is
//!    dropped whole.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, Citation, Retrieval, ScoredChunk};

/// Separator placed between chunks in the assembled context.
const CHUNK_SEPARATOR: &str = "\n\n";

/// How ranked chunks are admitted into the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The first K distinct chunks.
    #[default]
    TopK,
    /// The first K chunks from K distinct source groups.
    GroupDiverse,
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Maximum chunks (or groups, with [`SelectionPolicy::GroupDiverse`]).
    pub top_k: usize,
    pub policy: SelectionPolicy,
    /// Upper bound on the context length, in characters.
    pub max_context_chars: usize,
    /// Prefix every chunk with a `[#n • source]` line.
    pub citation_markers: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            policy: SelectionPolicy::TopK,
            max_context_chars: 6000,
            citation_markers: true,
        }
    }
}

/// Run the full retrieval pipeline for one query.
///
/// An empty query vector or an empty index yields an empty [`Retrieval`].
pub fn retrieve(query: &[f32], chunks: &[Chunk], params: &RetrievalParams) -> Retrieval {
    if query.is_empty() || chunks.is_empty() {
        return Retrieval::default();
    }
    let ranked = rank_chunks(query, chunks);
    let selected = select(&ranked, params);
    assemble(&selected, params)
}

/// Score and rank every chunk against the query.
pub fn rank_chunks<'a>(query: &[f32], chunks: &'a [Chunk]) -> Vec<ScoredChunk<'a>> {
    let mut scored: Vec<(usize, f64)> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(query, &c.embedding)))
        .collect();

    // `sort_by` is stable, so equal scores keep index order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .enumerate()
        .map(|(pos, (i, score))| ScoredChunk {
            chunk: &chunks[i],
            score,
            rank: pos + 1,
        })
        .collect()
}

/// Apply the selection policy to an already ranked list.
pub fn select<'a>(ranked: &[ScoredChunk<'a>], params: &RetrievalParams) -> Vec<ScoredChunk<'a>> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_groups: HashSet<&str> = HashSet::new();
    let mut selected = Vec::new();

    for scored in ranked {
        if selected.len() >= params.top_k {
            break;
        }
        let group = group_key(&scored.chunk.source);
        if params.policy == SelectionPolicy::GroupDiverse && seen_groups.contains(group) {
            continue;
        }
        if !seen_ids.insert(scored.chunk.id.as_str()) {
            continue;
        }
        seen_groups.insert(group);
        selected.push(scored.clone());
    }

    selected
}

/// Build the context string and citations within the character budget.
pub fn assemble(selected: &[ScoredChunk<'_>], params: &RetrievalParams) -> Retrieval {
    let separator_len = CHUNK_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut context_len = 0usize;
    let mut citations = Vec::new();

    for scored in selected {
        let piece = if params.citation_markers {
            format!(
                "{}\n{}",
                citation_marker(citations.len() + 1, &scored.chunk.source),
                scored.chunk.text
            )
        } else {
            scored.chunk.text.clone()
        };

        let added = piece.chars().count() + if context.is_empty() { 0 } else { separator_len };
        if context_len + added > params.max_context_chars {
            break;
        }

        if !context.is_empty() {
            context.push_str(CHUNK_SEPARATOR);
        }
        context.push_str(&piece);
        context_len += added;
        citations.push(Citation::from(scored));
    }

    Retrieval { context, citations }
}

/// `[#n • source]`, with `n` counted from 1 in inclusion order.
pub fn citation_marker(n: usize, source: &str) -> String {
    format!("[#{} • {}]", n, source)
}

/// Group used by [`SelectionPolicy::GroupDiverse`].
///
/// `page.html#about` → `page.html`; `notes/today.md` → `notes`.
pub fn group_key(source: &str) -> &str {
    match source.split_once('#') {
        Some((path, _)) => path,
        None => source.split('/').next().unwrap_or(source),
    }
}
