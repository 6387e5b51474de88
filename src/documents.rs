//! Document discovery.
//!
//! Walks the site root and returns every document the builder should chunk.
//! Hidden entries and the configured excluded directories (build artifacts,
//! dependency caches) are pruned before descending into them.

use anyhow::{bail, Context, Result};
use site_context_core::chunk::DocumentKind;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::config::BuildConfig;

/// A document read from disk.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Root-relative path with `/` separators.
    pub path: String,
    pub kind: DocumentKind,
    pub text: String,
}

/// Collect documents under `root`, sorted by relative path.
pub fn scan_documents(root: &Path, build: &BuildConfig) -> Result<Vec<SourceDocument>> {
    if !root.is_dir() {
        bail!("Document root does not exist: {}", root.display());
    }

    let extensions: Vec<String> = build
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry, &build.exclude_dirs));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), &extensions) {
            continue;
        }

        let path = entry.path();
        let relative = relative_path(root, path);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        documents.push(SourceDocument {
            kind: DocumentKind::from_path(&relative),
            text: String::from_utf8_lossy(&bytes).into_owned(),
            path: relative,
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(documents)
}

fn is_excluded(entry: &DirEntry, exclude_dirs: &[String]) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && exclude_dirs.iter().any(|d| d == name.as_ref())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_filters_and_prunes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "index.html", "<h1>Home</h1>");
        write(root, "notes/today.md", "# Today");
        write(root, "notes/deep/NOTE.MD", "upper-case extension");
        write(root, "script.js", "console.log(1)");
        write(root, ".hidden/secret.md", "hidden");
        write(root, ".draft.md", "hidden file");
        write(root, "data/vectors.md", "artifact dir");
        write(root, "node_modules/pkg/readme.md", "dependency");

        let docs = scan_documents(root, &BuildConfig::default()).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["index.html", "notes/deep/NOTE.MD", "notes/today.md"]);
        assert_eq!(docs[0].kind, DocumentKind::Markup);
        assert_eq!(docs[2].kind, DocumentKind::Plain);
        assert_eq!(docs[2].text, "# Today");
    }

    #[test]
    fn test_custom_extensions() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "text");
        write(tmp.path(), "b.md", "md");
        let build = BuildConfig {
            extensions: vec![".txt".to_string()],
            ..BuildConfig::default()
        };
        let docs = scan_documents(tmp.path(), &build).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "a.txt");
    }

    #[test]
    fn test_missing_root_errors() {
        let tmp = TempDir::new().unwrap();
        let err = scan_documents(&tmp.path().join("nope"), &BuildConfig::default()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
