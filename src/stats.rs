//! Index statistics and health overview.
//!
//! Summarizes what is indexed: record counts, vector width, file sizes and a
//! per-source breakdown. Used by `rag stats` to confirm that ingest runs are
//! landing where expected.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::index::VectorIndex;

/// Per-source record counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceStats {
    pub records: usize,
    pub truncated: usize,
    pub chars: usize,
}

/// Group records by source, ordered by record count (desc), then name.
pub fn source_breakdown(index: &VectorIndex) -> Vec<(String, SourceStats)> {
    let mut by_source: BTreeMap<String, SourceStats> = BTreeMap::new();
    for record in index.records() {
        let entry = by_source.entry(record.source.clone()).or_default();
        entry.records += 1;
        entry.chars += record.content.chars().count();
        if record.truncated_to.is_some() {
            entry.truncated += 1;
        }
    }
    let mut rows: Vec<(String, SourceStats)> = by_source.into_iter().collect();
    rows.sort_by(|a, b| b.1.records.cmp(&a.1.records).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// Run the stats command: load the index and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let index = VectorIndex::open(&config.paths.index_path, &config.paths.metadata_path)?;

    let index_size = file_size(index.index_path());
    let metadata_size = file_size(index.metadata_path());
    let truncated = index
        .records()
        .iter()
        .filter(|r| r.truncated_to.is_some())
        .count();

    println!("RAG Harness Index Stats");
    println!("=======================");
    println!();
    println!(
        "  Index:       {} ({})",
        index.index_path().display(),
        format_bytes(index_size)
    );
    println!(
        "  Metadata:    {} ({})",
        index.metadata_path().display(),
        format_bytes(metadata_size)
    );
    println!();
    println!("  Records:     {}", index.len());
    match index.dims() {
        Some(dims) => println!("  Dimensions:  {}", dims),
        None => println!("  Dimensions:  (unset)"),
    }
    println!("  Truncated:   {}", truncated);

    let rows = source_breakdown(&index);
    if !rows.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<48} {:>8} {:>10} {:>10}",
            "SOURCE", "RECORDS", "TRUNCATED", "CHARS"
        );
        println!("  {}", "-".repeat(80));
        for (source, s) in &rows {
            println!(
                "  {:<48} {:>8} {:>10} {:>10}",
                source, s.records, s.truncated, s.chars
            );
        }
    }

    println!();
    Ok(())
}

fn file_size(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
pub(crate) fn format_bytes(bytes: u64) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexedRecord;

    fn record(source: &str, content: &str, truncated_to: Option<usize>) -> IndexedRecord {
        IndexedRecord {
            hash: crate::chunk::hash_text(content),
            source: source.to_string(),
            content: content.to_string(),
            truncated_to,
            vector: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_source_breakdown_orders_by_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = VectorIndex::new(dir.path().join("i.bin"), dir.path().join("m.jsonl"));
        index
            .add(
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
                vec![
                    record("a.pdf", "alpha", None),
                    record("b.docx", "beta", Some(800)),
                    record("b.docx", "gamma", None),
                ],
            )
            .unwrap();

        let rows = source_breakdown(&index);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "b.docx");
        assert_eq!(
            rows[0].1,
            SourceStats {
                records: 2,
                truncated: 1,
                chars: 9
            }
        );
        assert_eq!(rows[1].1.records, 1);
    }
}
