//! In-memory embedding index with brute-force cosine search.
//!
//! An [`EmbeddingIndex`] is immutable once built. It owns a handle to the
//! [`Embedder`] that produced its vectors, so the model used for queries is
//! always the model used at build time.
//!
//! # Build
//!
//! 1. Embed chunk texts in batches of `batch_size`.
//! 2. Reject the build if any batch fails, returns the wrong number of
//!    vectors, or returns a vector of the wrong dimension.
//! 3. Pair each chunk with its vector in input order.
//!
//! Nothing is installed or persisted here; a failed build simply returns
//! an error and leaves no trace.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{KbError, Result};
use crate::models::{Chunk, IndexEntry, ScoredChunk};

/// Number of results returned when the caller does not choose.
pub const DEFAULT_TOP_K: usize = 4;

/// Descriptive facts about an index, persisted alongside its entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMetadata {
    pub model: String,
    pub dims: usize,
    pub entries: usize,
    pub built_at: DateTime<Utc>,
}

pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexEntry>,
    built_at: DateTime<Utc>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("model", &self.embedder.model_name())
            .field("entries", &self.entries.len())
            .field("built_at", &self.built_at)
            .finish()
    }
}

impl EmbeddingIndex {
    /// Embed every chunk and assemble a new index.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let mut entries = Vec::with_capacity(chunks.len());
        let mut pending = chunks.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(KbError::EmbeddingService(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (chunk, vector) in batch.into_iter().zip(vectors) {
                entries.push(IndexEntry { chunk, vector });
            }
            tracing::debug!(embedded = entries.len(), "embedding batch complete");
        }

        Self::from_entries(entries, embedder, Utc::now())
    }

    /// Assemble an index from already-embedded entries.
    ///
    /// Every vector must match the embedder's dimension.
    pub fn from_entries(
        entries: Vec<IndexEntry>,
        embedder: Arc<dyn Embedder>,
        built_at: DateTime<Utc>,
    ) -> Result<Self> {
        let dims = embedder.dims();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            return Err(KbError::EmbeddingService(format!(
                "vector for {}#{} has dimension {}, model '{}' declares {}",
                bad.chunk.source,
                bad.chunk.chunk_index,
                bad.vector.len(),
                embedder.model_name(),
                dims
            )));
        }
        Ok(Self {
            embedder,
            entries,
            built_at,
        })
    }

    /// Return the `k` entries most similar to `query_vec`, best first.
    ///
    /// Equal scores keep insertion order. Fewer than `k` entries means all
    /// of them are returned.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metadata(&self) -> IndexMetadata {
        IndexMetadata {
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            entries: self.entries.len(),
            built_at: self.built_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Maps each text to a fixed vector by looking at its first letter.
    struct LetterEmbedder {
        calls: Mutex<Vec<usize>>,
        fail_on_call: Option<usize>,
    }

    impl LetterEmbedder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on_call: None,
            }
        }
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(texts.len());
            if Some(calls.len()) == self.fail_on_call {
                return Err(KbError::EmbeddingService("quota exceeded".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| match t.chars().next() {
                    Some('a') => vec![1.0, 0.0, 0.0],
                    Some('b') => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    fn chunk(text: &str, i: i64) -> Chunk {
        Chunk {
            source: "doc.txt".to_string(),
            chunk_index: i,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_build_batches_and_search_ranks() {
        let embedder = Arc::new(LetterEmbedder::new());
        let chunks = vec![
            chunk("apple", 0),
            chunk("banana", 1),
            chunk("cherry", 2),
            chunk("avocado", 3),
            chunk("blueberry", 4),
        ];
        let index = EmbeddingIndex::build(chunks, embedder.clone(), 2)
            .await
            .unwrap();
        assert_eq!(*embedder.calls.lock().unwrap(), vec![2, 2, 1]);
        assert_eq!(index.len(), 5);

        let hits = index.search(&[0.0, 1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "banana");
        assert_eq!(hits[1].chunk.text, "blueberry");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let index = EmbeddingIndex::build(
            vec![chunk("a1", 0), chunk("c1", 1), chunk("a2", 2), chunk("a3", 3)],
            Arc::new(LetterEmbedder::new()),
            8,
        )
        .await
        .unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], 3);
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn test_fewer_entries_than_k_returns_all_best_first() {
        let index = EmbeddingIndex::build(
            vec![chunk("cherry", 0), chunk("apple", 1)],
            Arc::new(LetterEmbedder::new()),
            8,
        )
        .await
        .unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], DEFAULT_TOP_K);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "apple");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.score.is_finite()));
    }

    #[tokio::test]
    async fn test_zero_k_returns_nothing() {
        let index = EmbeddingIndex::build(vec![chunk("apple", 0)], Arc::new(LetterEmbedder::new()), 8)
            .await
            .unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 0).is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_fails_whole_build() {
        let embedder = Arc::new(LetterEmbedder {
            calls: Mutex::new(Vec::new()),
            fail_on_call: Some(2),
        });
        let err = EmbeddingIndex::build(
            vec![chunk("apple", 0), chunk("banana", 1), chunk("cherry", 2)],
            embedder,
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KbError::EmbeddingService(_)));
    }

    #[test]
    fn test_from_entries_rejects_wrong_dimension() {
        let entries = vec![IndexEntry {
            chunk: chunk("apple", 0),
            vector: vec![1.0, 0.0],
        }];
        let err = EmbeddingIndex::from_entries(entries, Arc::new(LetterEmbedder::new()), Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("dimension 2"));
    }

    #[test]
    fn test_metadata() {
        let index =
            EmbeddingIndex::from_entries(Vec::new(), Arc::new(LetterEmbedder::new()), Utc::now())
                .unwrap();
        let meta = index.metadata();
        assert_eq!(meta.model, "letters");
        assert_eq!(meta.dims, 3);
        assert_eq!(meta.entries, 0);
        assert!(index.is_empty());
    }
}
