//! Element-merging chunker.
//!
//! Accumulates element texts into a buffer until adding the next one would
//! push the running character count past `target_size`, then seals the
//! buffer (parts joined by `\n`) into a [`Chunk`]. With `overlap > 0` the
//! next buffer is seeded with the trailing `overlap` characters of the chunk
//! just sealed. An element is never split, so one oversized element becomes
//! exactly one chunk.
//!
//! Source attribution follows a fixed rule: a chunk sealed on overflow takes
//! the source of the element that triggered the seal, and the final chunk
//! takes the source of the last input element.

use sha2::{Digest, Sha256};

use crate::extract::SHORT_HASH_LEN;
use crate::models::{Chunk, ElementKind, RawElement};

/// Truncated hex SHA-256 of `text`. Depends on content only.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(SHORT_HASH_LEN);
    digest
}

/// Render table rows as a markdown table; the first row is the header.
pub fn render_table(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first() else {
        return String::new();
    };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format!("| {} |", header.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; header.len()].join(" | ")));
    for row in &rows[1..] {
        lines.push(format!("| {} |", row.join(" | ")));
    }
    lines.join("\n")
}

fn element_text(element: &RawElement) -> String {
    match &element.kind {
        ElementKind::Paragraph { text, .. } => text.clone(),
        ElementKind::Table { rows } => render_table(rows),
        ElementKind::Error { .. } => String::new(),
    }
}

fn make_chunk(content: String, source: &str) -> Chunk {
    Chunk {
        hash: hash_text(&content),
        content,
        source: source.to_string(),
        meta: Default::default(),
    }
}

/// Last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if n >= count {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

/// Merge elements into size-bounded chunks. Lengths are in characters.
pub fn chunk(elements: &[RawElement], target_size: usize, overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffer_len = 0usize;

    for element in elements {
        let text = element_text(element);
        if text.is_empty() {
            continue;
        }
        let len = text.chars().count();

        if buffer_len + len > target_size && !buffer.is_empty() {
            let merged = buffer.join("\n");
            if overlap > 0 {
                let seed = tail_chars(&merged, overlap).to_string();
                buffer_len = seed.chars().count() + len;
                buffer = vec![seed, text];
            } else {
                buffer = vec![text];
                buffer_len = len;
            }
            chunks.push(make_chunk(merged, &element.source));
        } else {
            buffer.push(text);
            buffer_len += len;
        }
    }

    if !buffer.is_empty() {
        let source = elements.last().map(|e| e.source.as_str()).unwrap_or("");
        chunks.push(make_chunk(buffer.join("\n"), source));
    }

    chunks
}
