//! Versioned index artifact.
//!
//! The index is the only hand-off between the builder and the retrieval
//! engine: a single JSON document holding every chunk with its embedding.
//!
//! ```json
//! { "version": 1, "model": "text-embedding-004", "dims": 768,
//!   "built_at": "2026-01-01T00:00:00Z",
//!   "chunks": [ { "id": "…", "text": "…", "source": "index.html#about",
//!                 "label": "About", "embedding": [0.1, 0.2] } ] }
//! ```
//!
//! Loading checks `version` before decoding the rest, so a file written by
//! an incompatible build is rejected instead of misread.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Chunk;

/// Schema version written by this build.
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub version: u32,
    /// Embedding model that produced the vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Length of the first non-empty embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
    pub chunks: Vec<Chunk>,
}

impl Index {
    /// Wrap freshly built chunks, stamping version, dims and build time.
    pub fn new(model: Option<String>, chunks: Vec<Chunk>) -> Self {
        let dims = chunks
            .iter()
            .map(|c| c.embedding.len())
            .find(|&len| len > 0);
        Self {
            version: INDEX_VERSION,
            model,
            dims,
            built_at: Some(Utc::now()),
            chunks,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of chunks stored without a usable embedding.
    pub fn degraded_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.embedding.is_empty()).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize index")
    }

    /// Parse an index, rejecting unversioned or foreign-version files.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).context("Index is not valid JSON")?;

        if value.is_array() {
            bail!("Index has no schema version (legacy flat array); rebuild it");
        }

        let version = value
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("Index is missing a numeric 'version' field"))?;

        if version != u64::from(INDEX_VERSION) {
            bail!(
                "Unsupported index version {} (this build reads version {})",
                version,
                INDEX_VERSION
            );
        }

        serde_json::from_value(value).context("Index does not match the expected schema")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;

    fn sample_chunk(text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk::new(
            DocumentChunk {
                text: text.to_string(),
                source: "notes/a.md".to_string(),
                label: None,
            },
            embedding,
        )
    }

    #[test]
    fn test_new_records_dims_from_first_embedding() {
        let index = Index::new(
            Some("m".to_string()),
            vec![sample_chunk("a", vec![]), sample_chunk("b", vec![0.5, 0.5, 0.0])],
        );
        assert_eq!(index.version, INDEX_VERSION);
        assert_eq!(index.dims, Some(3));
        assert_eq!(index.degraded_count(), 1);
    }

    #[test]
    fn test_json_preserves_chunks() {
        let index = Index::new(None, vec![sample_chunk("Alpha", vec![1.0, 0.0])]);
        let parsed = Index::from_json(&index.to_json().unwrap()).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_label_omitted_when_absent() {
        let index = Index::new(None, vec![sample_chunk("Alpha", vec![1.0])]);
        let json = index.to_json().unwrap();
        assert!(!json.contains("\"label\""));
    }

    #[test]
    fn test_rejects_legacy_array() {
        let err = Index::from_json(r#"[{"id":"a","text":"t","source":"s","embedding":[]}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("legacy"));
    }

    #[test]
    fn test_rejects_future_version() {
        let err = Index::from_json(r#"{"version": 2, "chunks": []}"#).unwrap_err();
        assert!(err.to_string().contains("Unsupported index version 2"));
    }

    #[test]
    fn test_rejects_missing_version() {
        assert!(Index::from_json(r#"{"chunks": []}"#).is_err());
    }

    #[test]
    fn test_missing_embedding_defaults_to_empty() {
        let raw = r#"{"version":1,"chunks":[{"id":"x","text":"t","source":"a.md"}]}"#;
        let index = Index::from_json(raw).unwrap();
        assert!(index.chunks[0].embedding.is_empty());
        assert_eq!(index.chunks[0].label, None);
    }
}
