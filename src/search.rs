//! Hybrid retrieval: vector similarity fused with BM25.
//!
//! # Pipeline
//!
//! 1. An empty query returns no results.
//! 2. The query is normalized (punctuation stripped, whitespace collapsed)
//!    and expanded with related terms for any topic it mentions.
//! 3. `lexical_weight == 0`: vector search only, over a candidate window
//!    widened by query length but never past `2k`.
//! 4. Otherwise vector and lexical search each fetch the same widened
//!    window, scores are divided by each method's own best score, and the
//!    two are fused per hash:
//!
//! ```text
//! combined = vector_score × (1 − w) + lexical_score × w
//! ```
//!
//! 5. Results under `min_score` are dropped, then near-duplicates (word-set
//!    Jaccard above `dedup_threshold` against an already kept result), and
//!    only then is the list cut to `k`.
//!
//! A retriever builds its lexical index once from the index snapshot it is
//! given and does not see records added afterwards.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::context::RagContext;
use crate::embedding::EmbeddingClient;
use crate::index::VectorIndex;
use crate::lexical::{jaccard, normalize_by_max, word_set, LexicalIndex};
use crate::models::{RetrievalResult, ScoredRecord};

/// Maximum per-hit debug lines logged per query.
const MAX_HIT_LOG_LINES: usize = 15;

/// Snippet length used by `format_contexts` callers.
pub const DEFAULT_SNIPPET_CHARS: usize = 220;

/// Replace characters outside letters and digits (any script) with spaces
/// and collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Append the related terms of every topic mentioned in `query`.
pub fn expand_query(query: &str, expansions: &BTreeMap<String, Vec<String>>) -> String {
    let lowered = query.to_lowercase();
    let mut expanded = query.to_string();
    for (topic, terms) in expansions {
        if !lowered.contains(&topic.to_lowercase()) {
            continue;
        }
        for term in terms {
            if !lowered.contains(&term.to_lowercase()) {
                expanded.push(' ');
                expanded.push_str(term);
            }
        }
    }
    expanded
}

/// Candidate window for vector-only search: grows with query length, capped at `2k`.
pub fn vector_only_candidates(k: usize, query_tokens: usize) -> usize {
    (k + query_tokens / 2).min(2 * k)
}

/// Candidate window for each method in hybrid search.
pub fn hybrid_candidates(k: usize) -> usize {
    (2 * k).max(k + 2).min(4 * k)
}

/// Merge normalized vector and lexical hits by hash and sort by fused score.
///
/// Chunks found by only one method get `0` for the other term. Vector hits
/// keep their relative order ahead of lexical-only hits on equal scores.
pub fn fuse(
    vector_hits: &[(ScoredRecord, f64)],
    lexical_hits: &[(ScoredRecord, f64)],
    weight: f64,
) -> Vec<RetrievalResult> {
    let mut merged: Vec<RetrievalResult> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (hit, score) in vector_hits {
        if position.contains_key(&hit.record.hash) {
            continue;
        }
        let mut result = RetrievalResult::from_record(&hit.record);
        result.vector_score = *score;
        result.score = score * (1.0 - weight);
        position.insert(hit.record.hash.clone(), merged.len());
        merged.push(result);
    }

    for (hit, score) in lexical_hits {
        match position.get(&hit.record.hash) {
            Some(&i) => {
                let result = &mut merged[i];
                if result.lexical_score == 0.0 {
                    result.lexical_score = *score;
                    result.score += score * weight;
                }
            }
            None => {
                let mut result = RetrievalResult::from_record(&hit.record);
                result.lexical_score = *score;
                result.score = score * weight;
                position.insert(hit.record.hash.clone(), merged.len());
                merged.push(result);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

/// Drop low scores and near-duplicates, keeping the first of each cluster.
pub fn filter_results(
    results: Vec<RetrievalResult>,
    min_score: f64,
    dedup_threshold: f64,
) -> Vec<RetrievalResult> {
    let mut kept: Vec<(RetrievalResult, HashSet<String>)> = Vec::new();
    for result in results {
        if result.score < min_score {
            continue;
        }
        let words = word_set(&result.content);
        if kept
            .iter()
            .any(|(_, seen)| jaccard(seen, &words) > dedup_threshold)
        {
            continue;
        }
        kept.push((result, words));
    }
    kept.into_iter().map(|(r, _)| r).collect()
}

/// Render results as numbered references with one-line snippets.
pub fn format_contexts(results: &[RetrievalResult], limit: usize) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut snippet: String = r.content.chars().take(limit).collect();
            if r.content.chars().count() > limit {
                snippet.push('…');
            }
            format!(
                "[ref {} | score={:.3}] {}\n  {}",
                i + 1,
                r.score,
                r.source,
                snippet.replace('\n', " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct HybridRetriever {
    index: Arc<VectorIndex>,
    lexical: LexicalIndex,
    embedder: Arc<EmbeddingClient>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<EmbeddingClient>,
        config: RetrievalConfig,
    ) -> Self {
        let lexical = LexicalIndex::build(index.records());
        Self {
            index,
            lexical,
            embedder,
            config,
        }
    }

    /// Records visible to this retriever.
    pub fn snapshot_len(&self) -> usize {
        self.index.len()
    }

    /// Retrieve with the configured `k` and lexical weight.
    pub async fn get_relevant(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        self.retrieve(query, self.config.k, self.config.lexical_weight)
            .await
    }

    /// Nearest records to the embedded query, raw cosine scores.
    pub async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<ScoredRecord>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .context("Failed to embed query")?;
        Ok(self.index.search(&vector, k)?)
    }

    /// BM25 hits with scores normalized to the best hit.
    pub fn lexical_search(&self, query: &str, k: usize) -> Vec<(ScoredRecord, f64)> {
        self.lexical
            .search(query, k)
            .into_iter()
            .filter_map(|(pos, score)| {
                self.index.records().get(pos).map(|record| {
                    (
                        ScoredRecord {
                            score: score as f32,
                            record: record.clone(),
                        },
                        score,
                    )
                })
            })
            .collect()
    }

    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        lexical_weight: f64,
    ) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let expanded = expand_query(&normalized, &self.config.expansions);

        let ranked = if lexical_weight <= 0.0 {
            let tokens = expanded.split_whitespace().count();
            let window = vector_only_candidates(k, tokens);
            self.vector_search(&expanded, window)
                .await?
                .into_iter()
                .map(|hit| {
                    let mut result = RetrievalResult::from_record(&hit.record);
                    result.vector_score = hit.score as f64;
                    result.score = hit.score as f64;
                    result
                })
                .collect()
        } else {
            let window = hybrid_candidates(k);
            let vector_hits = self.vector_search(&expanded, window).await?;
            let vector_hits = normalize_vector_hits(vector_hits);
            let lexical_hits = self.lexical_search(&expanded, window);
            fuse(&vector_hits, &lexical_hits, lexical_weight)
        };

        for (i, r) in ranked.iter().take(MAX_HIT_LOG_LINES).enumerate() {
            tracing::debug!(
                "hit[{}] combined={:.4} vec={:.4} bm25={:.4} src={} hash={}",
                i,
                r.score,
                r.vector_score,
                r.lexical_score,
                r.source,
                r.hash
            );
        }

        let mut results =
            filter_results(ranked, self.config.min_score, self.config.dedup_threshold);
        results.truncate(k);
        Ok(results)
    }
}

/// Output options for `rag retrieve`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetrieveOutput {
    pub json: bool,
    /// Print the numbered context block instead of the ranked listing.
    pub show_context: bool,
}

/// Run the retrieve command and print results on stdout.
pub async fn run_retrieve(
    ctx: &RagContext,
    query: &str,
    k: Option<usize>,
    lexical_weight: Option<f64>,
    output: RetrieveOutput,
) -> Result<()> {
    let k = k.unwrap_or(ctx.config().retrieval.k);
    let weight = lexical_weight.unwrap_or(ctx.config().retrieval.lexical_weight);
    if !(0.0..=1.0).contains(&weight) {
        bail!("--lexical-weight must be in [0.0, 1.0], got {}", weight);
    }

    let results = ctx.retrieve(query, k, weight).await?;

    if output.json {
        let items: Vec<serde_json::Value> = results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                serde_json::json!({
                    "ref": i + 1,
                    "score": r.score,
                    "vector_score": r.vector_score,
                    "lexical_score": r.lexical_score,
                    "source": r.source,
                    "hash": r.hash,
                    "content": r.content,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if output.show_context {
        println!("{}", format_contexts(&results, DEFAULT_SNIPPET_CHARS));
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, r.score, r.source);
        println!(
            "    vector: {:.3}  lexical: {:.3}",
            r.vector_score, r.lexical_score
        );
        let excerpt: String = r.content.chars().take(DEFAULT_SNIPPET_CHARS).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    hash: {}", r.hash);
        println!();
    }
    Ok(())
}

fn normalize_vector_hits(hits: Vec<ScoredRecord>) -> Vec<(ScoredRecord, f64)> {
    let scores: Vec<(usize, f64)> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| (i, h.score as f64))
        .collect();
    let normalized = normalize_by_max(scores);
    hits.into_iter()
        .zip(normalized)
        .map(|(hit, (_, score))| (hit, score))
        .collect()
}
