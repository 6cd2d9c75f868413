//! Per-file parsing into [`RawElement`]s.
//!
//! Dispatches on extension (`.docx`, `.pdf`), stamps every element with the
//! file's content hash, modification time and parser version, and turns any
//! failure into a single `Error` element so one bad file never aborts a batch.
//!
//! PDF inputs are screened before extraction: files over `max_pdf_mb` are
//! rejected without being read, and files whose decoded text is a tiny
//! fraction of their byte size (typically scans) are rejected after.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::config::IngestConfig;
use crate::docx::{self, Block};
use crate::error::ParseError;
use crate::models::{ElementKind, Origin, RawElement, PARSER_VERSION};

/// Hex characters kept from a SHA-256 digest.
pub const SHORT_HASH_LEN: usize = 16;

/// Truncated hex SHA-256 of a file's bytes. Empty if the file is unreadable.
pub fn file_hash(path: &Path) -> String {
    let Ok(mut file) = std::fs::File::open(path) else {
        return String::new();
    };
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(_) => return String::new(),
        }
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(SHORT_HASH_LEN);
    digest
}

fn file_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn origin_of(path: &Path) -> Result<Origin, ParseError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "docx" => Ok(Origin::Docx),
        "pdf" => Ok(Origin::Pdf),
        _ => Err(ParseError::Unsupported(path.display().to_string())),
    }
}

/// Parse one file. Never fails: errors are returned as one `Error` element.
pub fn parse_file(path: &Path, config: &IngestConfig) -> Vec<RawElement> {
    let source = path.display().to_string();
    let file_hash = file_hash(path);
    let mtime = file_mtime(path);

    let (origin, kinds) = match origin_of(path) {
        Ok(origin) => {
            let parsed = match origin {
                Origin::Docx => parse_docx_file(path),
                Origin::Pdf => parse_pdf_file(path, config),
            };
            (origin, parsed)
        }
        Err(e) => (Origin::Docx, Err(e)),
    };

    let kinds = kinds.unwrap_or_else(|e| {
        tracing::warn!(source = %source, error = %e, "parse failed");
        vec![ElementKind::Error {
            message: error_message(path, &e),
        }]
    });

    kinds
        .into_iter()
        .enumerate()
        .map(|(ordinal, kind)| RawElement {
            kind,
            source: source.clone(),
            ordinal,
            file_hash: file_hash.clone(),
            mtime,
            parser_version: PARSER_VERSION.to_string(),
            origin,
        })
        .collect()
}

/// `"<file name>: <reason>"`, so a message read on its own still names the file.
fn error_message(path: &Path, err: &ParseError) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("{}: {}", name, err)
}

fn parse_docx_file(path: &Path) -> Result<Vec<ElementKind>, ParseError> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::Io(e.to_string()))?;
    let blocks = docx::parse_docx(&bytes)?;
    Ok(blocks
        .into_iter()
        .map(|b| match b {
            Block::Paragraph { text, style } => ElementKind::Paragraph { text, style },
            Block::Table { rows } => ElementKind::Table { rows },
        })
        .collect())
}

fn parse_pdf_file(path: &Path, config: &IngestConfig) -> Result<Vec<ElementKind>, ParseError> {
    let size_bytes = std::fs::metadata(path)
        .map_err(|e| ParseError::Io(e.to_string()))?
        .len();
    if size_bytes > config.max_pdf_mb * 1024 * 1024 {
        return Err(ParseError::PdfOversize {
            max_mb: config.max_pdf_mb,
            size_bytes,
        });
    }

    let bytes = std::fs::read(path).map_err(|e| ParseError::Io(e.to_string()))?;
    let text = extract_pdf_text(&bytes)?;
    check_text_ratio(size_bytes, &text, config.low_pdf_text_ratio)?;

    Ok(split_paragraphs(&text)
        .into_iter()
        .map(|text| ElementKind::Paragraph {
            text,
            style: String::new(),
        })
        .collect())
}

/// `pdf_extract` can panic on malformed input; the panic is contained here.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, ParseError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ParseError::Pdf(e.to_string())),
        Err(_) => Err(ParseError::Pdf("extractor panicked".to_string())),
    }
}

fn check_text_ratio(size_bytes: u64, text: &str, low_ratio: f64) -> Result<(), ParseError> {
    let text_bytes = text.trim().len() as u64;
    let ratio = if size_bytes > 0 {
        text_bytes as f64 / size_bytes as f64
    } else {
        0.0
    };
    if ratio < low_ratio {
        return Err(ParseError::PdfLowTextRatio {
            size_bytes,
            text_bytes,
            ratio,
        });
    }
    Ok(())
}

/// Split on blank lines; blocks are trimmed and empty blocks dropped.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_block(&mut current, &mut out);
        } else {
            current.push(line);
        }
    }
    flush_block(&mut current, &mut out);
    out
}

fn flush_block(current: &mut Vec<&str>, out: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let block = current.join("\n").trim().to_string();
    if !block.is_empty() {
        out.push(block);
    }
    current.clear();
}
