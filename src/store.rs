//! Durable single-directory persistence for an [`EmbeddingIndex`].
//!
//! The index lives in `<dir>/index.sqlite` with two tables:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `index_meta` | `model`, `dims`, `entries`, `built_at` key/value rows |
//! | `entries` | one row per chunk: source, span, text, vector BLOB |
//!
//! Saving always replaces the whole directory. The new index is written to
//! a sibling staging directory first and then renamed into place, so the
//! configured location holds either the old index or the new one, never a
//! partial write. A missing directory is created on first save.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob, Embedder};
use crate::error::{KbError, Result};
use crate::index::{EmbeddingIndex, IndexMetadata};
use crate::models::{Chunk, IndexEntry};

const DB_FILE: &str = "index.sqlite";

/// Reads and writes the persisted index at a fixed directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a persisted index is present.
    pub fn exists(&self) -> bool {
        self.dir.join(DB_FILE).is_file()
    }

    /// Replace the directory's contents with `index`.
    pub async fn save(&self, index: &EmbeddingIndex) -> Result<()> {
        let staging = self.sibling("staging")?;
        std::fs::create_dir_all(&staging)?;

        if let Err(e) = write_db(&staging.join(DB_FILE), index).await {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        self.swap_in(&staging)?;
        tracing::info!(
            dir = %self.dir.display(),
            entries = index.len(),
            "persisted index"
        );
        Ok(())
    }

    /// Reopen the persisted index, pinned to `embedder`.
    ///
    /// Returns `Ok(None)` when nothing has been persisted yet. Fails with
    /// [`KbError::Config`] when the stored model or dimension differs from
    /// the embedder's.
    pub async fn load(&self, embedder: Arc<dyn Embedder>) -> Result<Option<EmbeddingIndex>> {
        if !self.exists() {
            return Ok(None);
        }

        let pool = connect(&self.dir.join(DB_FILE), false).await?;
        let meta = read_meta(&pool).await?;

        if meta.model != embedder.model_name() || meta.dims != embedder.dims() {
            pool.close().await;
            return Err(KbError::Config(format!(
                "index at {} was built with model '{}' ({} dims) but the configured embedder is '{}' ({} dims); rebuild the knowledge base",
                self.dir.display(),
                meta.model,
                meta.dims,
                embedder.model_name(),
                embedder.dims()
            )));
        }

        let rows = sqlx::query(
            "SELECT source, chunk_index, start_char, end_char, text, vector FROM entries ORDER BY seq",
        )
        .fetch_all(&pool)
        .await?;
        pool.close().await;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let vector: Vec<u8> = row.try_get("vector")?;
            entries.push(IndexEntry {
                chunk: Chunk {
                    source: row.try_get("source")?,
                    chunk_index: row.try_get("chunk_index")?,
                    start: row.try_get::<i64, _>("start_char")? as usize,
                    end: row.try_get::<i64, _>("end_char")? as usize,
                    text: row.try_get("text")?,
                },
                vector: blob_to_vec(&vector),
            });
        }

        if entries.len() != meta.entries {
            return Err(KbError::Storage(format!(
                "index at {} lists {} entries but holds {}",
                self.dir.display(),
                meta.entries,
                entries.len()
            )));
        }

        EmbeddingIndex::from_entries(entries, embedder, meta.built_at).map(Some)
    }

    /// Read only the metadata of the persisted index.
    pub async fn metadata(&self) -> Result<Option<IndexMetadata>> {
        if !self.exists() {
            return Ok(None);
        }
        let pool = connect(&self.dir.join(DB_FILE), false).await?;
        let meta = read_meta(&pool).await;
        pool.close().await;
        meta.map(Some)
    }

    /// A unique sibling path such as `<parent>/.index.staging-<uuid>`.
    fn sibling(&self, tag: &str) -> Result<PathBuf> {
        let name = self
            .dir
            .file_name()
            .ok_or_else(|| {
                KbError::Config(format!(
                    "index.dir must name a directory, got {}",
                    self.dir.display()
                ))
            })?
            .to_string_lossy()
            .to_string();
        let parent = match self.dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(parent.join(format!(".{}.{}-{}", name, tag, Uuid::new_v4())))
    }

    /// Move `staging` to the configured directory, discarding what was there.
    fn swap_in(&self, staging: &Path) -> Result<()> {
        if !self.dir.exists() {
            std::fs::rename(staging, &self.dir)?;
            return Ok(());
        }

        let retired = self.sibling("old")?;
        std::fs::rename(&self.dir, &retired)?;
        if let Err(e) = std::fs::rename(staging, &self.dir) {
            // Put the previous index back before reporting.
            let _ = std::fs::rename(&retired, &self.dir);
            let _ = std::fs::remove_dir_all(staging);
            return Err(e.into());
        }
        if let Err(e) = std::fs::remove_dir_all(&retired) {
            tracing::warn!(path = %retired.display(), error = %e, "could not remove retired index");
        }
        Ok(())
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn write_db(path: &Path, index: &EmbeddingIndex) -> Result<()> {
    let pool = connect(path, true).await?;
    let meta = index.metadata();

    sqlx::query(
        r#"
        CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE entries (
            seq INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_char INTEGER NOT NULL,
            end_char INTEGER NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    let mut tx = pool.begin().await?;

    let meta_rows = [
        ("model", meta.model.clone()),
        ("dims", meta.dims.to_string()),
        ("entries", meta.entries.to_string()),
        ("built_at", meta.built_at.to_rfc3339()),
    ];
    for (key, value) in meta_rows {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    for (seq, entry) in index.entries().iter().enumerate() {
        sqlx::query(
            "INSERT INTO entries (seq, source, chunk_index, start_char, end_char, text, vector) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(seq as i64)
        .bind(&entry.chunk.source)
        .bind(entry.chunk.chunk_index)
        .bind(entry.chunk.start as i64)
        .bind(entry.chunk.end as i64)
        .bind(&entry.chunk.text)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    pool.close().await;
    Ok(())
}

async fn read_meta(pool: &SqlitePool) -> Result<IndexMetadata> {
    let rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await?;

    let mut model = None;
    let mut dims = None;
    let mut entries = None;
    let mut built_at = None;
    for row in rows {
        let key: String = row.try_get("key")?;
        let value: String = row.try_get("value")?;
        match key.as_str() {
            "model" => model = Some(value),
            "dims" => dims = value.parse::<usize>().ok(),
            "entries" => entries = value.parse::<usize>().ok(),
            "built_at" => {
                built_at = DateTime::parse_from_rfc3339(&value)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            _ => {}
        }
    }

    match (model, dims, entries, built_at) {
        (Some(model), Some(dims), Some(entries), Some(built_at)) => Ok(IndexMetadata {
            model,
            dims,
            entries,
            built_at,
        }),
        _ => Err(KbError::Storage(
            "persisted index metadata is incomplete".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedEmbedder {
        name: &'static str,
        dims: usize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            self.name
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dims];
                    v[t.len() % self.dims] = 1.0;
                    v
                })
                .collect())
        }
    }

    fn embedder(name: &'static str, dims: usize) -> Arc<dyn Embedder> {
        Arc::new(FixedEmbedder { name, dims })
    }

    fn chunk(source: &str, i: i64, text: &str) -> Chunk {
        Chunk {
            source: source.to_string(),
            chunk_index: i,
            start: i as usize * 10,
            end: i as usize * 10 + text.chars().count(),
            text: text.to_string(),
        }
    }

    async fn sample_index(e: Arc<dyn Embedder>, texts: &[&str]) -> EmbeddingIndex {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| chunk("spec.md", i as i64, t))
            .collect();
        EmbeddingIndex::build(chunks, e, 16).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("index"));
        assert!(!store.exists());
        assert!(store.load(embedder("m", 4)).await.unwrap().is_none());

        let index = sample_index(embedder("m", 4), &["alpha", "beta", "gamma ray"]).await;
        store.save(&index).await.unwrap();
        assert!(store.exists());

        let loaded = store.load(embedder("m", 4)).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        for (a, b) in index.entries().iter().zip(loaded.entries()) {
            assert_eq!(a.chunk, b.chunk);
            assert_eq!(a.vector, b.vector);
        }
        assert_eq!(
            loaded.metadata().built_at.timestamp(),
            index.metadata().built_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_contents() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("index");
        let store = IndexStore::new(&dir);

        store
            .save(&sample_index(embedder("m", 4), &["old one", "old two"]).await)
            .await
            .unwrap();
        std::fs::write(dir.join("stray.txt"), "left behind").unwrap();

        store
            .save(&sample_index(embedder("m", 4), &["new"]).await)
            .await
            .unwrap();

        assert!(!dir.join("stray.txt").exists());
        let loaded = store.load(embedder("m", 4)).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].chunk.text, "new");

        // No staging or retired directories are left next to the index.
        let siblings: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(siblings, vec!["index".to_string()]);
    }

    #[tokio::test]
    async fn test_load_rejects_other_model() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("index"));
        store
            .save(&sample_index(embedder("model-a", 4), &["alpha"]).await)
            .await
            .unwrap();

        let err = store.load(embedder("model-b", 4)).await.unwrap_err();
        assert!(matches!(err, KbError::Config(_)));
        let err = store.load(embedder("model-a", 8)).await.unwrap_err();
        assert!(matches!(err, KbError::Config(_)));
    }

    #[tokio::test]
    async fn test_metadata_without_loading_entries() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("nested").join("index"));
        assert!(store.metadata().await.unwrap().is_none());

        store
            .save(&sample_index(embedder("m", 4), &["a", "b"]).await)
            .await
            .unwrap();
        let meta = store.metadata().await.unwrap().unwrap();
        assert_eq!(meta.model, "m");
        assert_eq!(meta.dims, 4);
        assert_eq!(meta.entries, 2);
    }
}
