//! Typed errors for the parse, embed and index stages.
//!
//! Parse and embed failures are contained: they become `Error` elements or
//! skip counters. Index errors are structural and propagate to the caller.

use thiserror::Error;

/// Failure to turn one source file into elements.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("docx extraction failed: {0}")]
    Docx(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("pdf_oversize>{max_mb}MB")]
    PdfOversize { max_mb: u64, size_bytes: u64 },
    #[error("pdf_low_text_ratio size_bytes={size_bytes} text_bytes={text_bytes} ratio={ratio:.4}")]
    PdfLowTextRatio {
        size_bytes: u64,
        text_bytes: u64,
        ratio: f64,
    },
}

/// Failure to obtain an embedding for one text.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request rejected {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unrecognized embedding response shape")]
    UnrecognizedShape,
    #[error("embedding failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<EmbedError> },
}

impl EmbedError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::Transport(_)
                | EmbedError::Server { .. }
                | EmbedError::RateLimited(_)
                | EmbedError::UnrecognizedShape
        )
    }

    /// Whether the next attempt should send a shorter text.
    pub fn should_shrink(&self) -> bool {
        matches!(self, EmbedError::Server { .. })
    }
}

/// Structural failure of the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: index has {expected}, batch has {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("batch vectors have inconsistent widths ({first} vs {other})")]
    Ragged { first: usize, other: usize },
    #[error("zero-width vectors cannot be indexed")]
    EmptyVector,
    #[error("{vectors} vectors but {records} metadata records")]
    LengthMismatch { vectors: usize, records: usize },
    #[error("persistence failed for {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt index: {0}")]
    Corrupt(String),
}
