//! Shared fixtures: a local mock embedding server and document builders.

#![allow(dead_code)]

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

use rag_harness::config::Config;

pub const DIMS: usize = 64;

/// Deterministic bag-of-words vector: each lowercase token bumps one bucket.
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let h = token
            .to_lowercase()
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
        v[h as usize % DIMS] += 1.0;
    }
    if v.iter().all(|x| *x == 0.0) {
        v[0] = 1.0;
    }
    v
}

async fn embed(Json(body): Json<Value>) -> Response {
    let prompt = body["prompt"].as_str().unwrap_or_default();
    if prompt.contains("FAIL500") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
    }
    Json(json!({ "embedding": bag_of_words(prompt) })).into_response()
}

/// Start an Ollama-style embedder on an ephemeral port; returns its base URL.
pub async fn spawn_embedder() -> String {
    let app = Router::new().route("/api/embeddings", post(embed));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Config rooted in `dir`, pointed at `embed_url`, with small chunks and no
/// retry backoff.
pub fn test_config(dir: &Path, embed_url: &str) -> Config {
    let mut config = Config::default();
    config.paths.docs_root = dir.join("docs");
    config.paths.index_path = dir.join("vector_store/index.bin");
    config.paths.metadata_path = dir.join("vector_store/meta.jsonl");
    config.chunking.size = 200;
    config.chunking.overlap = 0;
    config.embedding.url = embed_url.to_string();
    config.embedding.backoff_ms = 0;
    config.embedding.timeout_secs = 5;
    config
}

/// Same settings as [`test_config`], as a TOML file for the binary.
pub fn write_config_file(dir: &Path, embed_url: &str) -> std::path::PathBuf {
    let content = format!(
        r#"[paths]
docs_root = "{root}/docs"
index_path = "{root}/vector_store/index.bin"
metadata_path = "{root}/vector_store/meta.jsonl"

[chunking]
size = 200
overlap = 0

[embedding]
url = "{url}"
backoff_ms = 0
timeout_secs = 5

[retrieval]
k = 3
lexical_weight = 0.3
"#,
        root = dir.display(),
        url = embed_url
    );
    let path = dir.join("rag.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `.docx` bytes whose body holds one paragraph per entry. Raw XML fragments
/// (starting with `<`) are inserted as-is.
pub fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| {
            if p.starts_with('<') {
                p.to_string()
            } else {
                format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", escape(p))
            }
        })
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Paragraph holding a display fraction `a/b`.
pub const FRACTION_PARAGRAPH: &str = "<w:p><w:r><w:t>ratio </w:t></w:r><m:oMath><m:f><m:num><m:r><m:t>a</m:t></m:r></m:num><m:den><m:r><m:t>b</m:t></m:r></m:den></m:f></m:oMath></w:p>";

/// Two topic documents plus one with an embedder-poisoning paragraph.
pub fn write_corpus(docs: &Path) {
    std::fs::create_dir_all(docs).unwrap();
    std::fs::write(
        docs.join("simplex.docx"),
        docx_with_paragraphs(&[
            "The simplex method walks the vertices of the feasible polytope of a linear program.",
            "Each simplex pivot swaps one basic variable for a nonbasic variable.",
            FRACTION_PARAGRAPH,
        ]),
    )
    .unwrap();
    std::fs::write(
        docs.join("clustering.docx"),
        docx_with_paragraphs(&[
            "K-means clustering assigns every sample to its nearest centroid.",
            "Hierarchical clustering merges the closest clusters step by step.",
        ]),
    )
    .unwrap();
}

/// Parseable one-page PDF with no text operators (a scan has only images),
/// padded with an unreferenced `padding`-byte stream. Offsets in the xref
/// table are computed so the extractor can open it.
pub fn textless_pdf(padding: usize) -> Vec<u8> {
    let content: &[u8] = b"0 0 m 100 100 l S";
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(format!("4 0 obj << /Length {} >> stream\n", content.len()).as_bytes());
    out.extend_from_slice(content);
    out.extend_from_slice(b"\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(format!("5 0 obj << /Length {} >> stream\n", padding).as_bytes());
    out.extend(std::iter::repeat(b'A').take(padding));
    out.extend_from_slice(b"\nendstream endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
