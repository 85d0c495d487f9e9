//! Query-time retrieval over the active index.
//!
//! The query is embedded with the embedder pinned to the index snapshot, so
//! build-time and query-time vectors always come from the same model.

use std::sync::Arc;

use crate::active::ActiveIndex;
use crate::error::{KbError, Result};
use crate::models::ScoredChunk;

pub struct Retriever {
    active: Arc<ActiveIndex>,
}

impl Retriever {
    pub fn new(active: Arc<ActiveIndex>) -> Self {
        Self { active }
    }

    /// Top-`k` chunks for `query`, best first, with their scores.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let index = self.active.snapshot().await?;
        let query_vec = index.embedder().embed_query(query).await?;
        let dims = index.embedder().dims();
        if query_vec.len() != dims {
            return Err(KbError::EmbeddingService(format!(
                "query vector has {} dimensions, index expects {}",
                query_vec.len(),
                dims
            )));
        }
        let hits = index.search(&query_vec, k);
        tracing::debug!(k, hits = hits.len(), "retrieved context");
        Ok(hits)
    }

    /// Top-`k` chunk texts for `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.chunk.text)
            .collect())
    }
}
