//! Caller-owned pipeline state.
//!
//! A [`RagContext`] bundles the configuration, the embedding client and the
//! vector index so that entry points receive their collaborators explicitly.
//! The index is held as an immutable snapshot behind a `RwLock`: queries
//! clone the `Arc` and run without blocking each other, while an ingestion
//! run works on a private copy and swaps it in when done. The ingest mutex
//! allows one build at a time.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::build::{self, BuildReport};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::index::VectorIndex;
use crate::models::{Chunk, RetrievalResult};
use crate::search::HybridRetriever;

pub struct RagContext {
    config: Config,
    embedder: Arc<EmbeddingClient>,
    index: RwLock<Arc<VectorIndex>>,
    retriever: RwLock<Option<Arc<HybridRetriever>>>,
    ingest_lock: Mutex<()>,
}

impl RagContext {
    /// Open the configured index and an HTTP embedding client.
    pub fn open(config: Config) -> Result<Self> {
        let embedder = EmbeddingClient::new(&config.embedding)?;
        Self::with_embedder(config, embedder)
    }

    pub fn with_embedder(config: Config, embedder: EmbeddingClient) -> Result<Self> {
        let index = VectorIndex::open(&config.paths.index_path, &config.paths.metadata_path)
            .with_context(|| {
                format!(
                    "Failed to load index from {}",
                    config.paths.index_path.display()
                )
            })?;
        Ok(Self {
            config,
            embedder: Arc::new(embedder),
            index: RwLock::new(Arc::new(index)),
            retriever: RwLock::new(None),
            ingest_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// Current index snapshot.
    pub async fn index(&self) -> Arc<VectorIndex> {
        self.index.read().await.clone()
    }

    /// Embed and append new chunks, then publish the grown index.
    pub async fn build_or_update(&self, chunks: &[Chunk]) -> Result<BuildReport> {
        let _guard = self.ingest_lock.lock().await;

        let mut working = VectorIndex::clone(&*self.index().await);
        let report = build::build_or_update(
            chunks,
            &mut working,
            &self.embedder,
            &self.config.embedding.fallback_limits,
        )
        .await?;

        if report.added > 0 {
            *self.index.write().await = Arc::new(working);
            *self.retriever.write().await = None;
        }
        Ok(report)
    }

    /// Remove both index files and start from an empty index.
    pub async fn reset(&self) -> Result<Vec<std::path::PathBuf>> {
        let _guard = self.ingest_lock.lock().await;
        let mut removed = Vec::new();
        for path in [&self.config.paths.index_path, &self.config.paths.metadata_path] {
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed.push(path.clone());
            }
        }
        *self.index.write().await = Arc::new(VectorIndex::new(
            &self.config.paths.index_path,
            &self.config.paths.metadata_path,
        ));
        *self.retriever.write().await = None;
        Ok(removed)
    }

    /// Retriever over the current snapshot, rebuilt after the index changes.
    pub async fn retriever(&self) -> Arc<HybridRetriever> {
        if let Some(retriever) = self.retriever.read().await.as_ref() {
            return retriever.clone();
        }
        let mut slot = self.retriever.write().await;
        if let Some(retriever) = slot.as_ref() {
            return retriever.clone();
        }
        let retriever = Arc::new(HybridRetriever::new(
            self.index().await,
            self.embedder.clone(),
            self.config.retrieval.clone(),
        ));
        *slot = Some(retriever.clone());
        retriever
    }

    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        lexical_weight: f64,
    ) -> Result<Vec<RetrievalResult>> {
        self.retriever()
            .await
            .retrieve(query, k, lexical_weight)
            .await
    }
}
