//! Index file persistence.
//!
//! The builder writes the whole index at once through a temporary file in the
//! destination directory that is then renamed over the target, so readers
//! only ever see the previous index or the complete new one.

use anyhow::{Context, Result};
use site_context_core::index::Index;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub fn load_index(path: &Path) -> Result<Index> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index: {}", path.display()))?;
    Index::from_json(&raw).with_context(|| format!("Failed to load index: {}", path.display()))
}

/// Atomically replace `path` with `index`.
pub fn save_index(index: &Index, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let json = index.to_json()?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write index: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use site_context_core::models::{Chunk, DocumentChunk};
    use tempfile::TempDir;

    fn index_with(text: &str) -> Index {
        let piece = DocumentChunk {
            text: text.to_string(),
            source: "a.md".to_string(),
            label: Some("a.md".to_string()),
        };
        Index::new(Some("test-model".to_string()), vec![Chunk::new(piece, vec![1.0, 0.0])])
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("vectors.json");
        let index = index_with("Alpha");
        save_index(&index, &path).unwrap();
        assert_eq!(load_index(&path).unwrap(), index);
    }

    #[test]
    fn test_save_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.json");
        save_index(&index_with("old"), &path).unwrap();
        save_index(&index_with("new"), &path).unwrap();
        assert_eq!(load_index(&path).unwrap().chunks[0].text, "new");

        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_load_missing_mentions_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.json");
        let err = load_index(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }

    #[test]
    fn test_load_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vectors.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_index(&path).is_err());
    }
}
