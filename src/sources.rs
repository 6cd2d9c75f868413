//! Document listing for `rag docs`.
//!
//! Shows every file discovery would ingest, with its content hash and
//! whether the index already holds records from it.

use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::Config;
use crate::discover::discover_files;
use crate::extract::file_hash;
use crate::index::VectorIndex;
use crate::stats::format_bytes;

#[derive(Debug, Clone)]
pub struct DocEntry {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: i64,
    pub hash: String,
    pub indexed: bool,
}

/// Discovered documents under the configured root, in path order.
pub fn list_docs(config: &Config) -> Result<Vec<DocEntry>> {
    let index = VectorIndex::open(&config.paths.index_path, &config.paths.metadata_path)?;
    let indexed: HashSet<&str> = index.records().iter().map(|r| r.source.as_str()).collect();

    let files = discover_files(&config.paths.docs_root, &config.ingest)?;
    Ok(files
        .into_iter()
        .map(|path| {
            let meta = std::fs::metadata(&path).ok();
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            let mtime = meta
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let source = path.display().to_string();
            DocEntry {
                hash: file_hash(&path),
                indexed: indexed.contains(source.as_str()),
                path,
                size,
                mtime,
            }
        })
        .collect())
}

pub fn run_docs(config: &Config) -> Result<()> {
    let docs = list_docs(config)?;
    if docs.is_empty() {
        println!("No documents under {}", config.paths.docs_root.display());
        return Ok(());
    }

    println!(
        "{:<16} {:>10} {:<16} {:<7} PATH",
        "HASH", "SIZE", "MODIFIED", "INDEXED"
    );
    for doc in &docs {
        println!(
            "{:<16} {:>10} {:<16} {:<7} {}",
            doc.hash,
            format_bytes(doc.size),
            format_ts(doc.mtime),
            if doc.indexed { "yes" } else { "no" },
            doc.path.display()
        );
    }
    println!();
    println!(
        "{} documents, {} indexed",
        docs.len(),
        docs.iter().filter(|d| d.indexed).count()
    );
    Ok(())
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00");
    }

    #[test]
    fn test_list_docs_marks_unindexed() {
        let dir = tempfile::tempdir().unwrap();
        let docs_root = dir.path().join("docs");
        std::fs::create_dir_all(&docs_root).unwrap();
        std::fs::write(docs_root.join("a.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(docs_root.join("notes.txt"), b"ignored").unwrap();

        let mut config = Config::default();
        config.paths.docs_root = docs_root;
        config.paths.index_path = dir.path().join("store/index.bin");
        config.paths.metadata_path = dir.path().join("store/meta.jsonl");

        let docs = list_docs(&config).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].size, 8);
        assert_eq!(docs[0].hash.len(), 16);
        assert!(!docs[0].indexed);
    }
}
