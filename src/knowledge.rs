//! Knowledge base orchestration.
//!
//! Owns the active index and mediates the build and query operations:
//!
//! ```text
//! build_knowledge_base(paths)
//!   load → chunk → embed → persist → install        (Empty|Built → Built)
//!
//! generate_test_cases(request)
//!   retrieve(request) → test-case prompt → generator → raw text
//!
//! generate_script(test_case, html)
//!   retrieve(test_case) → script prompt (+ html) → generator → raw text
//! ```
//!
//! A build either installs a complete new index or changes nothing: load,
//! chunk, embed, and persist all finish before the active index is swapped.
//! Every build replaces the previous index wholesale; documents from earlier
//! builds are not retained.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::active::ActiveIndex;
use crate::chunk::{chunks, ChunkParams};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{KbError, Result};
use crate::generation::{create_generator, Generator};
use crate::index::{EmbeddingIndex, IndexMetadata, DEFAULT_TOP_K};
use crate::loader::load_document;
use crate::models::{Chunk, Document, ScoredChunk};
use crate::prompt;
use crate::retriever::Retriever;
use crate::store::IndexStore;

/// Tunables for a [`KnowledgeBase`].
#[derive(Debug, Clone)]
pub struct KnowledgeBaseOptions {
    pub index_dir: PathBuf,
    pub chunking: ChunkParams,
    pub top_k: usize,
    pub batch_size: usize,
}

impl KnowledgeBaseOptions {
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            chunking: ChunkParams::default(),
            top_k: DEFAULT_TOP_K,
            batch_size: 64,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            index_dir: config.index.dir.clone(),
            chunking: config.chunking.params()?,
            top_k: config.retrieval.top_k,
            batch_size: config.embedding.batch_size,
        })
    }
}

/// Summary of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub files: usize,
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KbStatus {
    Empty,
    Built(IndexMetadata),
}

pub struct KnowledgeBase {
    active: Arc<ActiveIndex>,
    retriever: Retriever,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: IndexStore,
    options: KnowledgeBaseOptions,
    build_lock: Mutex<()>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base. Nothing is read from disk.
    pub fn new(
        options: KnowledgeBaseOptions,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        if options.top_k == 0 {
            return Err(KbError::Config("top_k must be >= 1".to_string()));
        }

        let active = Arc::new(ActiveIndex::new());
        Ok(Self {
            retriever: Retriever::new(active.clone()),
            active,
            embedder,
            generator,
            store: IndexStore::new(options.index_dir.clone()),
            options,
            build_lock: Mutex::new(()),
        })
    }

    /// Create a knowledge base with the configured providers and, when
    /// `index.load_on_start` is set, reopen the persisted index.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let kb = Self::new(KnowledgeBaseOptions::from_config(config)?, embedder, generator)?;
        if config.index.load_on_start {
            kb.load_persisted().await?;
        }
        Ok(kb)
    }

    /// Install the persisted index if one exists. Returns whether one was.
    pub async fn load_persisted(&self) -> Result<bool> {
        let _guard = self.build_lock.lock().await;
        match self.store.load(self.embedder.clone()).await? {
            Some(index) => {
                tracing::info!(
                    dir = %self.store.dir().display(),
                    entries = index.len(),
                    "loaded persisted index"
                );
                self.active.replace(index).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load, chunk, and index `file_paths`, replacing any previous index.
    ///
    /// Files are read under the build lock, so concurrent builds each see
    /// their own inputs.
    pub async fn build_knowledge_base<P: AsRef<Path>>(&self, file_paths: &[P]) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        let mut documents = Vec::with_capacity(file_paths.len());
        for path in file_paths {
            documents.push(load_document(path.as_ref(), None)?);
        }
        self.build_locked(documents).await
    }

    /// Index already-loaded documents, replacing any previous index.
    pub async fn build_from_documents(&self, documents: Vec<Document>) -> Result<BuildReport> {
        let _guard = self.build_lock.lock().await;
        self.build_locked(documents).await
    }

    /// Caller holds `build_lock`.
    async fn build_locked(&self, documents: Vec<Document>) -> Result<BuildReport> {
        let files = documents.len();
        let all_chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunks(doc, self.options.chunking))
            .collect();
        drop(documents);

        let chunk_count = all_chunks.len();
        tracing::info!(files, chunks = chunk_count, "building index");

        let index = EmbeddingIndex::build(
            all_chunks,
            self.embedder.clone(),
            self.options.batch_size,
        )
        .await?;
        self.store.save(&index).await?;

        let meta = index.metadata();
        self.active.replace(index).await;
        tracing::info!(model = %meta.model, entries = meta.entries, "index installed");

        Ok(BuildReport {
            files,
            chunks: chunk_count,
            model: meta.model,
            dims: meta.dims,
        })
    }

    /// Top-`k` chunks for `query` (defaults to the configured `top_k`).
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredChunk>> {
        self.retriever
            .retrieve_scored(query, k.unwrap_or(self.options.top_k))
            .await
    }

    /// Generate test cases for `request`, grounded in retrieved context.
    ///
    /// The generator's response is returned verbatim.
    pub async fn generate_test_cases(&self, request: &str) -> Result<String> {
        let context = self.retriever.retrieve(request, self.options.top_k).await?;
        let prompt = prompt::test_case_prompt(&prompt::join_context(&context), request);
        self.generator.complete(&prompt).await
    }

    /// Generate an automation script for one test case against `html`.
    ///
    /// Retrieval is driven by `test_case` alone; the markup is only placed
    /// in the prompt.
    pub async fn generate_script(&self, test_case: &str, html: &str) -> Result<String> {
        let context = self.retriever.retrieve(test_case, self.options.top_k).await?;
        let prompt = prompt::script_prompt(test_case, html, &prompt::join_context(&context));
        self.generator.complete(&prompt).await
    }

    pub async fn status(&self) -> KbStatus {
        match self.active.snapshot().await {
            Ok(index) => KbStatus::Built(index.metadata()),
            Err(_) => KbStatus::Empty,
        }
    }

    pub fn options(&self) -> &KnowledgeBaseOptions {
        &self.options
    }
}
