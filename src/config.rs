//! TOML configuration.
//!
//! Every section and key has a default, so an empty file is a valid
//! configuration. Relative paths in `[paths]` resolve against the directory
//! that contains the config file.
//!
//! ```toml
//! [paths]
//! docs_root = "./docs"
//! index_path = "vector_store/index.bin"
//! metadata_path = "vector_store/meta.jsonl"
//!
//! [chunking]
//! size = 1200
//! overlap = 120
//!
//! [embedding]
//! api = "ollama"
//! url = "http://localhost:11434"
//! model = "nomic-embed-text:v1.5"
//!
//! [retrieval]
//! k = 6
//! lexical_weight = 0.35
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_root: default_docs_root(),
            index_path: default_index_path(),
            metadata_path: default_metadata_path(),
        }
    }
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("vector_store/index.bin")
}
fn default_metadata_path() -> PathBuf {
    PathBuf::from("vector_store/meta.jsonl")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_pdf_mb")]
    pub max_pdf_mb: u64,
    #[serde(default = "default_low_pdf_text_ratio")]
    pub low_pdf_text_ratio: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_pdf_mb: default_max_pdf_mb(),
            low_pdf_text_ratio: default_low_pdf_text_ratio(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.docx".to_string(), "**/*.pdf".to_string()]
}
fn default_max_pdf_mb() -> u64 {
    25
}
fn default_low_pdf_text_ratio() -> f64 {
    0.02
}

/// Chunk sizes are measured in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1200
}
fn default_chunk_overlap() -> usize {
    120
}

/// Wire dialect of the embedding service.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingApi {
    /// `POST {url}/api/embeddings` with `{model, prompt}`.
    Ollama,
    /// `POST {url}/v1/embeddings` with `{model, input}`.
    Openai,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_api")]
    pub api: EmbeddingApi,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_shrink_factor")]
    pub shrink_factor: f64,
    #[serde(default = "default_shrink_floor")]
    pub shrink_floor: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Character limits tried in order when a chunk cannot be embedded whole.
    #[serde(default = "default_fallback_limits")]
    pub fallback_limits: Vec<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api: default_api(),
            url: default_url(),
            model: default_model(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_chars: default_max_chars(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            shrink_factor: default_shrink_factor(),
            shrink_floor: default_shrink_floor(),
            timeout_secs: default_timeout_secs(),
            fallback_limits: default_fallback_limits(),
        }
    }
}

fn default_api() -> EmbeddingApi {
    EmbeddingApi::Ollama
}
fn default_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "nomic-embed-text:v1.5".to_string()
}
fn default_batch_size() -> usize {
    8
}
fn default_concurrency() -> usize {
    1
}
fn default_max_chars() -> usize {
    3500
}
fn default_max_attempts() -> u32 {
    4
}
fn default_backoff_ms() -> u64 {
    1500
}
fn default_shrink_factor() -> f64 {
    0.6
}
fn default_shrink_floor() -> usize {
    800
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_fallback_limits() -> Vec<usize> {
    vec![2000, 1200, 800, 600, 400]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,
    /// Topic token → related terms appended to a query that mentions it.
    #[serde(default = "default_expansions")]
    pub expansions: BTreeMap<String, Vec<String>>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            lexical_weight: default_lexical_weight(),
            min_score: default_min_score(),
            dedup_threshold: default_dedup_threshold(),
            expansions: default_expansions(),
        }
    }
}

fn default_k() -> usize {
    6
}
fn default_lexical_weight() -> f64 {
    0.35
}
fn default_min_score() -> f64 {
    0.1
}
fn default_dedup_threshold() -> f64 {
    0.8
}

fn default_expansions() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 6] = [
        ("线性规划", &["目标函数", "约束条件", "单纯形法"]),
        ("整数规划", &["分支定界", "割平面"]),
        ("回归", &["最小二乘", "拟合", "残差"]),
        ("聚类", &["k-means", "层次聚类"]),
        ("optimization", &["objective", "constraint", "solver"]),
        ("regression", &["least squares", "fit", "residual"]),
    ];
    table
        .iter()
        .map(|(topic, terms)| {
            (
                topic.to_string(),
                terms.iter().map(|t| t.to_string()).collect(),
            )
        })
        .collect()
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.paths.resolve_against(base);
    config.validate()?;
    Ok(config)
}

impl PathsConfig {
    fn resolve_against(&mut self, base: &Path) {
        for p in [
            &mut self.docs_root,
            &mut self.index_path,
            &mut self.metadata_path,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 {
            bail!("chunking.size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.size {
            bail!("chunking.overlap must be < chunking.size");
        }

        let e = &self.embedding;
        if e.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if e.concurrency == 0 {
            bail!("embedding.concurrency must be > 0");
        }
        if e.max_attempts == 0 {
            bail!("embedding.max_attempts must be >= 1");
        }
        if e.max_chars == 0 {
            bail!("embedding.max_chars must be > 0");
        }
        if !(e.shrink_factor > 0.0 && e.shrink_factor < 1.0) {
            bail!("embedding.shrink_factor must be in (0.0, 1.0)");
        }

        let r = &self.retrieval;
        if r.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        for (name, value) in [
            ("retrieval.lexical_weight", r.lexical_weight),
            ("retrieval.min_score", r.min_score),
            ("retrieval.dedup_threshold", r.dedup_threshold),
            ("ingest.low_pdf_text_ratio", self.ingest.low_pdf_text_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be in [0.0, 1.0]", name);
            }
        }
        Ok(())
    }
}
