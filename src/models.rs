//! Core data models that flow through the ingestion and retrieval pipeline.
//!
//! ```text
//! file ──▶ RawElement* ──▶ Chunk* ──▶ IndexedRecord (persisted) ──▶ RetrievalResult
//! ```
//!
//! `RawElement`s live only for the duration of an ingestion run. `Chunk`s are
//! re-derivable by re-parsing. `IndexedRecord`s are the persisted source of
//! truth, positionally aligned with the vectors held by the index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version tag stamped on every parsed element.
pub const PARSER_VERSION: &str = "2025-09-01a";

/// Where an element was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Docx,
    Pdf,
}

/// The typed payload of a parsed element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Paragraph { text: String, style: String },
    Table { rows: Vec<Vec<String>> },
    Error { message: String },
}

/// One element of a parsed source file, tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    #[serde(flatten)]
    pub kind: ElementKind,
    pub source: String,
    pub ordinal: usize,
    pub file_hash: String,
    pub mtime: i64,
    pub parser_version: String,
    pub origin: Origin,
}

impl RawElement {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ElementKind::Error { .. })
    }

    /// Paragraph text, if this element is a paragraph.
    pub fn paragraph_text(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Paragraph { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// A content-addressed unit of text sized for embedding.
///
/// `hash` depends on `content` alone, so identical text from two files
/// collapses to a single identity in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub hash: String,
    pub source: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// A persisted metadata record; record `i` describes the `i`-th indexed vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub hash: String,
    pub source: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_to: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndexedRecord {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>, truncated_to: Option<usize>) -> Self {
        Self {
            hash: chunk.hash.clone(),
            source: chunk.source.clone(),
            content: chunk.content.clone(),
            truncated_to,
            vector: Some(vector),
            extra: chunk.meta.clone(),
        }
    }
}

/// A vector-index hit: inner-product score plus the stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub score: f32,
    pub record: IndexedRecord,
}

/// One ranked context returned by the hybrid retriever.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hash: String,
    pub score: f64,
    pub vector_score: f64,
    pub lexical_score: f64,
    pub source: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_to: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RetrievalResult {
    pub(crate) fn from_record(record: &IndexedRecord) -> Self {
        Self {
            hash: record.hash.clone(),
            score: 0.0,
            vector_score: 0.0,
            lexical_score: 0.0,
            source: record.source.clone(),
            content: record.content.clone(),
            truncated_to: record.truncated_to,
            extra: record.extra.clone(),
        }
    }
}
