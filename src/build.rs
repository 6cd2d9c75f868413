//! Incremental index build.
//!
//! `build_or_update` embeds only chunks whose hash is not yet indexed,
//! appends them in one batch and persists. A chunk that cannot be embedded
//! whole is retried at each length in the fallback ladder; if every rung
//! fails the chunk is skipped and counted, and the run carries on.

use std::collections::HashSet;

use crate::embedding::{truncate_chars, EmbeddingClient};
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::models::{Chunk, IndexedRecord};

/// Outcome of one build run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Vectors appended by this run.
    pub added: usize,
    /// New chunks whose embedding failed at every fallback length.
    pub skipped: usize,
    /// Candidates dropped because their hash was already indexed or repeated.
    pub duplicates: usize,
    /// Records in the index after the run.
    pub total: usize,
}

pub async fn build_or_update(
    chunks: &[Chunk],
    index: &mut VectorIndex,
    embedder: &EmbeddingClient,
    fallback_limits: &[usize],
) -> Result<BuildReport, IndexError> {
    let mut seen: HashSet<&str> = index.records().iter().map(|r| r.hash.as_str()).collect();
    let mut report = BuildReport::default();

    let mut fresh: Vec<&Chunk> = Vec::new();
    for chunk in chunks {
        if seen.insert(chunk.hash.as_str()) {
            fresh.push(chunk);
        } else {
            report.duplicates += 1;
        }
    }

    if fresh.is_empty() {
        report.total = index.len();
        tracing::info!(added = 0, skipped = 0, total = report.total, "build_or_update");
        return Ok(report);
    }

    let texts: Vec<String> = fresh.iter().map(|c| c.content.clone()).collect();
    let first_pass = embedder.embed_documents(&texts).await;

    let mut vectors = Vec::with_capacity(fresh.len());
    let mut records = Vec::with_capacity(fresh.len());

    for (chunk, result) in fresh.into_iter().zip(first_pass) {
        let embedded = match result {
            Ok(e) => Some((e.vector, e.truncated.then_some(e.sent_chars))),
            Err(e) => {
                tracing::warn!(hash = %chunk.hash, limit = -1, error = %e, "embed_fail");
                embed_with_fallback(chunk, embedder, fallback_limits).await
            }
        };

        match embedded {
            Some((vector, truncated_to)) => {
                records.push(IndexedRecord::from_chunk(chunk, vector.clone(), truncated_to));
                vectors.push(vector);
            }
            None => {
                tracing::error!(hash = %chunk.hash, "embed_skip reason=all_attempts_failed");
                report.skipped += 1;
            }
        }
    }

    report.added = vectors.len();
    if !vectors.is_empty() {
        index.add(vectors, records)?;
        index.persist()?;
    }
    report.total = index.len();

    tracing::info!(
        added = report.added,
        skipped = report.skipped,
        total = report.total,
        "build_or_update"
    );
    Ok(report)
}

/// Walk the ladder of shorter prefixes. Rungs not shorter than the content
/// would resend the same text and are passed over.
async fn embed_with_fallback(
    chunk: &Chunk,
    embedder: &EmbeddingClient,
    fallback_limits: &[usize],
) -> Option<(Vec<f32>, Option<usize>)> {
    let length = chunk.content.chars().count();
    for &limit in fallback_limits.iter().filter(|&&l| l < length) {
        let text = truncate_chars(&chunk.content, limit);
        match embedder.embed_one(text).await {
            Ok(e) => {
                let sent = if e.truncated { e.sent_chars } else { limit };
                return Some((e.vector, Some(sent)));
            }
            Err(e) => {
                tracing::warn!(hash = %chunk.hash, limit, error = %e, "embed_fail");
            }
        }
    }
    None
}
