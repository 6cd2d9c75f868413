//! # RAG Harness
//!
//! Document ingestion and hybrid retrieval core for retrieval-augmented
//! question answering over a local library of `.docx` and `.pdf` files.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │ discover │──▶│  parse   │──▶│  chunk  │──▶│   embed   │──▶│ VectorIndex  │
//! │ walk+glob│   │docx/omml │   │ size +  │   │ batch +   │   │ flat IP +    │
//! │          │   │   pdf    │   │ overlap │   │ retry     │   │ NDJSON meta  │
//! └──────────┘   └──────────┘   └─────────┘   └───────────┘   └──────┬───────┘
//!                                                                     │
//!                                         ┌───────────────────────────┤
//!                                         ▼                           ▼
//!                                   ┌──────────┐              ┌──────────────┐
//!                                   │   BM25   │─────────────▶│HybridRetriever│
//!                                   └──────────┘   fuse       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest --rebuild            # parse, chunk, embed, index
//! rag retrieve "simplex pivot"    # hybrid retrieval
//! rag retrieve "线性规划" --lexical-weight 0
//! rag stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`discover`] | Document discovery under the docs root |
//! | [`extract`] | File-level parsing into raw elements |
//! | [`docx`] | Word document body walking |
//! | [`omml`] | Office Math to LaTeX |
//! | [`chunk`] | Size-bounded chunking with overlap |
//! | [`embedding`] | Embedding HTTP client with retry |
//! | [`index`] | Persistent vector index |
//! | [`build`] | Incremental index builds |
//! | [`lexical`] | BM25 keyword search |
//! | [`search`] | Hybrid retrieval |
//! | [`context`] | Shared pipeline state |
//! | [`ingest`] | `rag ingest` orchestration |

pub mod build;
pub mod chunk;
pub mod config;
pub mod context;
pub mod discover;
pub mod docx;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod lexical;
pub mod models;
pub mod omml;
pub mod progress;
pub mod search;
pub mod sources;
pub mod stats;
mod xml;

pub use context::RagContext;
