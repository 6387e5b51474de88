//! Index statistics.
//!
//! Summarises what the current index holds: build metadata, chunk and
//! embedding counts, and a per-group breakdown. Used by `site-ctx stats` to
//! check that a build produced what was expected.

use anyhow::Result;
use chrono::{DateTime, Utc};
use site_context_core::index::Index;
use site_context_core::retrieve::group_key;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::store::load_index;

/// Chunk counts for one source group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    pub group: String,
    pub chunks: usize,
    pub embedded: usize,
}

/// Groups ordered by chunk count (desc), then name.
pub fn group_stats(index: &Index) -> Vec<GroupStats> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for chunk in &index.chunks {
        let entry = groups.entry(group_key(&chunk.source)).or_default();
        entry.0 += 1;
        if !chunk.embedding.is_empty() {
            entry.1 += 1;
        }
    }

    let mut stats: Vec<GroupStats> = groups
        .into_iter()
        .map(|(group, (chunks, embedded))| GroupStats {
            group: group.to_string(),
            chunks,
            embedded,
        })
        .collect();
    stats.sort_by(|a, b| b.chunks.cmp(&a.chunks).then_with(|| a.group.cmp(&b.group)));
    stats
}

/// Distinct document paths (source without the `#anchor`).
pub fn document_count(index: &Index) -> usize {
    index
        .chunks
        .iter()
        .map(|c| c.source.split('#').next().unwrap_or(&c.source))
        .collect::<BTreeSet<_>>()
        .len()
}

/// Run the stats command: load the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let path = &config.index.path;
    let index = load_index(path)?;

    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let total = index.len();
    let embedded = total - index.degraded_count();

    println!("site-context: index stats");
    println!("=========================");
    println!();
    println!("  Index:       {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Version:     {}", index.version);
    println!("  Model:       {}", index.model.as_deref().unwrap_or("unknown"));
    println!(
        "  Dims:        {}",
        index.dims.map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    println!(
        "  Built:       {}",
        index.built_at.map_or_else(|| "unknown".to_string(), format_built_at)
    );
    println!();
    println!("  Documents:   {}", document_count(&index));
    println!("  Chunks:      {}", total);
    println!(
        "  Embedded:    {} / {} ({}%)",
        embedded,
        total,
        if total > 0 { (embedded * 100) / total } else { 0 }
    );

    let groups = group_stats(&index);
    if !groups.is_empty() {
        println!();
        println!("  By group:");
        println!("  {:<32} {:>8} {:>10}", "GROUP", "CHUNKS", "EMBEDDED");
        println!("  {}", "-".repeat(52));
        for g in &groups {
            println!("  {:<32} {:>8} {:>10}", g.group, g.chunks, g.embedded);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_built_at(ts: DateTime<Utc>) -> String {
    format!("{} ({})", ts.format("%Y-%m-%d %H:%M"), format_relative(ts, Utc::now()))
}

/// "3 hours ago" style description of `ts` relative to `now`.
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        "in the future".to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
