//! BM25 keyword search over indexed chunk content.
//!
//! The `bm25` engine runs with [`CjkTokenizer`] instead of its default
//! English pipeline: Latin-script runs become lowercase words, and runs of
//! CJK ideographs become unigrams plus overlapping bigrams, since they carry
//! no whitespace to split on. No transliteration, stemming or stopword
//! removal is applied. Documents are the positions of records in the
//! metadata snapshot the index is built from.

use bm25::{Document, SearchEngine, SearchEngineBuilder, Tokenizer};
use std::collections::HashSet;

use crate::models::IndexedRecord;

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{20000}'..='\u{2A6DF}')
}

/// Split text into search tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    for c in text.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            cjk_run.push(c);
        } else if c.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            word.extend(c.to_lowercase());
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);
    tokens
}

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

fn flush_cjk(run: &mut Vec<char>, tokens: &mut Vec<String>) {
    for c in run.iter() {
        tokens.push(c.to_string());
    }
    for pair in run.windows(2) {
        tokens.push(pair.iter().collect());
    }
    run.clear();
}

/// Distinct tokens of `text`, used for near-duplicate detection.
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// `|a ∩ b| / |a ∪ b|`; zero when both are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// [`tokenize`] as a `bm25` tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CjkTokenizer;

impl Tokenizer for CjkTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

pub struct LexicalIndex {
    engine: SearchEngine<u32, u32, CjkTokenizer>,
    len: usize,
}

impl LexicalIndex {
    /// Build from a metadata snapshot. Later index growth is not reflected.
    pub fn build(records: &[IndexedRecord]) -> Self {
        let documents: Vec<Document<u32>> = records
            .iter()
            .enumerate()
            .map(|(i, record)| Document {
                id: i as u32,
                contents: record.content.clone(),
            })
            .collect();
        let engine =
            SearchEngineBuilder::<u32, u32, CjkTokenizer>::with_tokenizer_and_documents(
                CjkTokenizer,
                documents,
            )
            .build();
        Self {
            engine,
            len: records.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Up to `k` `(record position, score)` pairs, best first, with scores
    /// divided by the best raw score among them.
    pub fn search(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        if tokenize(query).is_empty() {
            return Vec::new();
        }

        let hits: Vec<(usize, f64)> = self
            .engine
            .search(query, k)
            .into_iter()
            .filter(|r| r.score > 0.0)
            .map(|r| (r.document.id as usize, r.score as f64))
            .collect();
        normalize_by_max(hits)
    }
}

/// Divide every score by the largest one. Non-positive maxima zero out.
pub fn normalize_by_max(hits: Vec<(usize, f64)>) -> Vec<(usize, f64)> {
    let max = hits.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    hits.into_iter()
        .map(|(i, s)| (i, if max > 0.0 { s / max } else { 0.0 }))
        .collect()
}
