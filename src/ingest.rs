//! Ingestion pipeline orchestration.
//!
//! Coordinates one ingest run: discovery → parsing → chunking → embedding →
//! index append. Parsing never aborts the run; failures surface as error
//! elements and are counted in the run statistics. Only a vector width
//! change during the append is fatal.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::chunk::chunk;
use crate::config::IngestConfig;
use crate::context::RagContext;
use crate::discover::discover_files;
use crate::extract::parse_file;
use crate::models::{ElementKind, Origin, RawElement, PARSER_VERSION};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};

/// Below this share of math paragraphs rendered without placeholders the
/// run prints a coverage warning.
const MATH_COVERAGE_WARN: f64 = 0.7;

const MAX_ERROR_SAMPLES: usize = 3;
const SAMPLE_PREVIEW_CHARS: usize = 80;

/// Options for a single `rag ingest` invocation.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Docs root; falls back to `paths.docs_root`.
    pub root: Option<PathBuf>,
    /// Delete both index files before ingesting.
    pub rebuild: bool,
    /// Parse at most this many discovered files.
    pub limit_files: Option<usize>,
    /// Print the first N parsed elements.
    pub sample: usize,
    /// Parse and chunk only; no embedding calls, no index writes.
    pub dry_run: bool,
}

/// Parse every file in order, concatenating their elements.
pub fn ingest_files(files: &[PathBuf], config: &IngestConfig) -> Vec<RawElement> {
    ingest_files_with_progress(files, config, &NoProgress)
}

pub fn ingest_files_with_progress(
    files: &[PathBuf],
    config: &IngestConfig,
    progress: &dyn IngestProgressReporter,
) -> Vec<RawElement> {
    let total = files.len() as u64;
    let mut elements = Vec::new();
    for (i, path) in files.iter().enumerate() {
        elements.extend(parse_file(path, config));
        progress.report(IngestProgressEvent::Parsing {
            n: i as u64 + 1,
            total,
        });
    }
    elements
}

/// Discover and parse everything under `root`.
pub fn ingest_root(
    root: &Path,
    config: &IngestConfig,
    limit_files: Option<usize>,
) -> Result<Vec<RawElement>> {
    let mut files = discover_files(root, config)?;
    if let Some(limit) = limit_files {
        files.truncate(limit);
    }
    Ok(ingest_files(&files, config))
}

/// Counts over one run's raw elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub paragraphs: usize,
    pub docx_paragraphs: usize,
    pub pdf_paragraphs: usize,
    pub math_paragraphs: usize,
    pub placeholder_paragraphs: usize,
    pub tables: usize,
    pub errors: usize,
    /// `(source, message)` of the first few parse errors.
    pub error_samples: Vec<(String, String)>,
}

impl IngestStats {
    pub fn from_elements(elements: &[RawElement]) -> Self {
        let mut stats = Self::default();
        for el in elements {
            match &el.kind {
                ElementKind::Paragraph { text, .. } => {
                    stats.paragraphs += 1;
                    match el.origin {
                        Origin::Docx => stats.docx_paragraphs += 1,
                        Origin::Pdf => stats.pdf_paragraphs += 1,
                    }
                    if is_math(text) {
                        stats.math_paragraphs += 1;
                    }
                    if text.contains("/*math*/") {
                        stats.placeholder_paragraphs += 1;
                    }
                }
                ElementKind::Table { .. } => stats.tables += 1,
                ElementKind::Error { message } => {
                    stats.errors += 1;
                    if stats.error_samples.len() < MAX_ERROR_SAMPLES {
                        stats
                            .error_samples
                            .push((el.source.clone(), message.clone()));
                    }
                }
            }
        }
        stats
    }

    /// Share of paragraphs free of math placeholders. `None` without paragraphs.
    pub fn math_coverage(&self) -> Option<f64> {
        if self.paragraphs == 0 {
            return None;
        }
        Some((self.paragraphs - self.placeholder_paragraphs) as f64 / self.paragraphs as f64)
    }

    pub fn coverage_is_low(&self) -> bool {
        self.math_coverage()
            .map(|c| c < MATH_COVERAGE_WARN)
            .unwrap_or(false)
    }
}

fn is_math(text: &str) -> bool {
    text.contains("$ ") || text.contains("\\frac") || text.contains("\\sqrt")
}

/// One-line preview of an element for `--sample`.
pub fn describe_element(el: &RawElement) -> String {
    match &el.kind {
        ElementKind::Paragraph { text, .. } => {
            text.chars().take(SAMPLE_PREVIEW_CHARS).collect()
        }
        ElementKind::Table { rows } => format!(
            "table rows={} cols={}",
            rows.len(),
            rows.first().map(|r| r.len()).unwrap_or(0)
        ),
        ElementKind::Error { message } => format!("ERROR: {}", message),
    }
}

/// Run the ingest command and print a summary on stdout.
pub async fn run_ingest(
    ctx: &RagContext,
    opts: &IngestOptions,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    let config = ctx.config();
    let root = opts
        .root
        .clone()
        .unwrap_or_else(|| config.paths.docs_root.clone());

    if opts.rebuild && !opts.dry_run {
        for path in ctx.reset().await? {
            tracing::info!(path = %path.display(), "removed index file");
        }
    }

    progress.report(IngestProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let mut files = discover_files(&root, &config.ingest)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    let discovered = files.len();
    if let Some(limit) = opts.limit_files {
        files.truncate(limit);
    }

    let elements = ingest_files_with_progress(&files, &config.ingest, progress);
    let stats = IngestStats::from_elements(&elements);
    tracing::info!(
        files = files.len(),
        elements = elements.len(),
        errors = stats.errors,
        "parsed documents"
    );

    if opts.dry_run {
        println!("ingest {} (dry-run)", root.display());
    } else {
        println!("ingest {}", root.display());
    }
    println!("  files: {} (of {} discovered)", files.len(), discovered);
    println!(
        "  elements: {} (parser {})",
        elements.len(),
        PARSER_VERSION
    );
    println!(
        "  paragraphs: {} (docx {}, pdf {})",
        stats.paragraphs, stats.docx_paragraphs, stats.pdf_paragraphs
    );
    println!(
        "  math paragraphs: {} (placeholders {})",
        stats.math_paragraphs, stats.placeholder_paragraphs
    );
    println!("  tables: {}", stats.tables);
    println!("  parse errors: {}", stats.errors);
    for (_, message) in &stats.error_samples {
        println!("    {}", message);
    }
    if let Some(coverage) = stats.math_coverage() {
        println!("  math coverage: {:.1}%", coverage * 100.0);
        if stats.coverage_is_low() {
            println!(
                "  warning: math coverage below {:.0}%",
                MATH_COVERAGE_WARN * 100.0
            );
        }
    }

    if opts.sample > 0 {
        println!("  sample:");
        for (i, el) in elements.iter().take(opts.sample).enumerate() {
            println!("    [{}] {} | {}", i, el.source, describe_element(el));
        }
    }

    let chunks = chunk(&elements, config.chunking.size, config.chunking.overlap);
    println!(
        "  chunks: {} (size={}, overlap={})",
        chunks.len(),
        config.chunking.size,
        config.chunking.overlap
    );

    if opts.dry_run {
        println!("ok");
        return Ok(());
    }

    progress.report(IngestProgressEvent::Embedding {
        chunks: chunks.len() as u64,
    });
    let report = ctx.build_or_update(&chunks).await?;

    println!("  vectors added: {}", report.added);
    println!("  skipped: {}", report.skipped);
    println!("  duplicates: {}", report.duplicates);
    println!("  index records: {}", report.total);
    println!("ok");
    Ok(())
}
