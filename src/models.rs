//! Core data models used throughout the QA harness.
//!
//! These types represent the documents, chunks, and index entries that flow
//! through the build and query pipeline.

use serde::Serialize;

/// Declared format of a document, used to pick its loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Structured,
}

/// Raw document text produced by a loader. Discarded once chunked.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path or filename the text was read from.
    pub source: String,
    pub format: Option<DocumentFormat>,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format: None,
            text: text.into(),
        }
    }

    pub fn with_format(mut self, format: DocumentFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// A contiguous window of a document's text.
///
/// `start` and `end` are character offsets (not bytes) into the parent text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub source: String,
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A search hit: the chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
