//! Binary-level tests for the `rag` CLI.

mod common;

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use common::{spawn_embedder, write_config_file, write_corpus};

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run the binary off the async runtime so the mock embedder keeps serving.
async fn run_rag_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_rag(&config_path, &args)
    })
    .await
    .unwrap()
}

#[test]
fn test_help() {
    let output = Command::new(rag_binary()).arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("ingest"));
    assert!(stdout.contains("retrieve"));
}

#[test]
fn test_completions_without_config() {
    let output = Command::new(rag_binary())
        .args(["--config", "/nonexistent/rag.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("rag"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_rag(Path::new("/nonexistent/rag.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = write_config_file(tmp.path(), "http://127.0.0.1:9");
    write_corpus(&tmp.path().join("docs"));

    let (stdout, stderr, success) = run_rag(&config, &["ingest", "--dry-run", "--sample", "2"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("files: 2"));
    assert!(stdout.contains("paragraphs: 5"));
    assert!(stdout.contains("sample:"));
    assert!(stdout.contains("chunks:"));
    assert!(!tmp.path().join("vector_store").exists());
}

#[test]
fn test_docs_and_stats_on_empty_index() {
    let tmp = TempDir::new().unwrap();
    let config = write_config_file(tmp.path(), "http://127.0.0.1:9");
    write_corpus(&tmp.path().join("docs"));

    let (stdout, _, success) = run_rag(&config, &["docs"]);
    assert!(success);
    assert!(stdout.contains("simplex.docx"));
    assert!(stdout.contains("2 documents, 0 indexed"));

    let (stdout, _, success) = run_rag(&config, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Records:     0"));
    assert!(stdout.contains("(unset)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ingest_then_retrieve() {
    let url = spawn_embedder().await;
    let tmp = TempDir::new().unwrap();
    let config = write_config_file(tmp.path(), &url);
    write_corpus(&tmp.path().join("docs"));

    let (stdout, stderr, success) = run_rag_async(&config, &["ingest"]).await;
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("vectors added: 2"));

    let (stdout, _, success) = run_rag_async(&config, &["ingest"]).await;
    assert!(success);
    assert!(stdout.contains("vectors added: 0"));

    let (stdout, stderr, success) =
        run_rag_async(&config, &["retrieve", "simplex pivot", "--json"]).await;
    assert!(success, "retrieve failed: {}", stderr);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let first = &results.as_array().unwrap()[0];
    assert_eq!(first["ref"], 1);
    assert!(first["content"].as_str().unwrap().contains("simplex"));
    assert_eq!(first["hash"].as_str().unwrap().len(), 16);

    let (stdout, _, success) =
        run_rag_async(&config, &["retrieve", "simplex pivot", "--show-context"]).await;
    assert!(success);
    assert!(stdout.starts_with("[ref 1 | score="));

    let (stdout, _, success) = run_rag_async(&config, &["docs"]).await;
    assert!(success);
    assert!(stdout.contains("indexed"));

    let (stdout, _, success) = run_rag_async(&config, &["ingest", "--rebuild"]).await;
    assert!(success);
    assert!(stdout.contains("vectors added: 2"));
}

#[test]
fn test_retrieve_rejects_bad_weight() {
    let tmp = TempDir::new().unwrap();
    let config = write_config_file(tmp.path(), "http://127.0.0.1:9");
    let (_, stderr, success) =
        run_rag(&config, &["retrieve", "anything", "--lexical-weight", "1.5"]);
    assert!(!success);
    assert!(stderr.contains("--lexical-weight"));
}
