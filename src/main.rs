//! # RAG Harness CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Parse, chunk, embed and append new documents to the index |
//! | `rag retrieve "<query>"` | Hybrid retrieval over the index |
//! | `rag docs` | List discoverable documents and whether they are indexed |
//! | `rag stats` | Summarize the index |
//! | `rag completions <shell>` | Print shell completions |
//!
//! Logs go to stderr; set `RUST_LOG` to override the level chosen by
//! `--verbose`.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_harness::config;
use rag_harness::ingest::{self, IngestOptions};
use rag_harness::progress::ProgressMode;
use rag_harness::search::{self, RetrieveOutput};
use rag_harness::{sources, stats, RagContext};

/// RAG Harness CLI: document ingestion and hybrid retrieval.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "RAG Harness: document ingestion and hybrid retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Log at debug level (per-hit scores, embedding calls).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents into the index.
    ///
    /// Discovers `.docx`/`.pdf` files, parses them, chunks the text, embeds
    /// chunks not yet indexed, and appends them. Re-running over unchanged
    /// files adds nothing.
    Ingest {
        /// Docs root (defaults to `paths.docs_root`).
        #[arg(long)]
        root: Option<PathBuf>,

        /// Delete the index files first and re-embed everything.
        #[arg(long)]
        rebuild: bool,

        /// Parse at most this many files.
        #[arg(long)]
        limit_files: Option<usize>,

        /// Print the first N parsed elements.
        #[arg(long, default_value_t = 0)]
        sample: usize,

        /// Parse and chunk only; no embedding calls or index writes.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr (defaults to human on a TTY, otherwise off).
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Retrieve the chunks most relevant to a query.
    Retrieve {
        /// Query text.
        query: String,

        /// Number of results (defaults to `retrieval.k`).
        #[arg(short, long)]
        k: Option<usize>,

        /// BM25 weight in [0, 1]; 0 disables lexical search.
        #[arg(long)]
        lexical_weight: Option<f64>,

        /// Emit results as JSON.
        #[arg(long)]
        json: bool,

        /// Print the numbered context block.
        #[arg(long, conflicts_with = "json")]
        show_context: bool,
    },

    /// List documents under the docs root.
    Docs,

    /// Show index statistics.
    Stats,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "rag", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            root,
            rebuild,
            limit_files,
            sample,
            dry_run,
            progress,
        } => {
            let ctx = RagContext::open(cfg)?;
            let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
            let opts = IngestOptions {
                root,
                rebuild,
                limit_files,
                sample,
                dry_run,
            };
            ingest::run_ingest(&ctx, &opts, reporter.as_ref()).await?;
        }
        Commands::Retrieve {
            query,
            k,
            lexical_weight,
            json,
            show_context,
        } => {
            let ctx = RagContext::open(cfg)?;
            let output = RetrieveOutput { json, show_context };
            search::run_retrieve(&ctx, &query, k, lexical_weight, output).await?;
        }
        Commands::Docs => {
            sources::run_docs(&cfg)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
