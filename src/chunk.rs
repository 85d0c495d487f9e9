//! Sliding-window text chunker.
//!
//! Splits document text into overlapping windows of at most `max_size`
//! characters. Each window starts `max_size - overlap` characters after the
//! previous one, so the last `overlap` characters of window *i* recur at the
//! start of window *i + 1*.
//!
//! Boundaries are character based, not semantic: there is no sentence or
//! paragraph awareness. Offsets count Unicode scalar values, so a window
//! never splits a multi-byte UTF-8 sequence.
//!
//! # Guarantees
//!
//! - An empty document yields no chunks.
//! - A document of at most `max_size` characters yields exactly one chunk
//!   equal to the whole text.
//! - The final window may be shorter than `max_size`; it is still emitted.
//! - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
//!
//! # Example
//!
//! ```rust
//! use qa_harness::chunk::{chunk_document, ChunkParams};
//! use qa_harness::models::Document;
//!
//! let doc = Document::new("notes.txt", "a".repeat(1500));
//! let chunks = chunk_document(&doc, ChunkParams::default());
//! assert_eq!(chunks.len(), 2);
//! assert_eq!((chunks[1].start, chunks[1].end), (800, 1500));
//! ```

use crate::error::{KbError, Result};
use crate::models::{Chunk, Document};

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

/// Window size and overlap, both in characters.
///
/// Only constructible through [`ChunkParams::new`] or `Default`, so every
/// value advances the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_size: usize,
    overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkParams {
    /// Rejects parameters that would never advance the window.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(KbError::Config("chunk max_size must be > 0".to_string()));
        }
        if overlap >= max_size {
            return Err(KbError::Config(format!(
                "chunk overlap ({}) must be smaller than max_size ({})",
                overlap, max_size
            )));
        }
        Ok(Self { max_size, overlap })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.max_size - self.overlap
    }
}

/// Lazy, restartable iterator over a document's chunks.
///
/// Cloning the iterator restarts from the clone point without re-reading
/// the document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    doc: &'a Document,
    /// Byte offset of every char, plus the text length as a sentinel.
    offsets: Vec<usize>,
    params: ChunkParams,
    next_start: Option<usize>,
    next_index: i64,
}

impl<'a> Chunks<'a> {
    fn new(doc: &'a Document, params: ChunkParams) -> Self {
        let mut offsets: Vec<usize> = doc.text.char_indices().map(|(i, _)| i).collect();
        offsets.push(doc.text.len());
        let next_start = if doc.text.is_empty() { None } else { Some(0) };
        Self {
            doc,
            offsets,
            params,
            next_start,
            next_index: 0,
        }
    }

    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_start?;
        let total = self.char_len();
        let end = (start + self.params.max_size).min(total);

        self.next_start = if end >= total {
            None
        } else {
            Some(start + self.params.step())
        };

        let chunk = Chunk {
            source: self.doc.source.clone(),
            chunk_index: self.next_index,
            start,
            end,
            text: self.doc.text[self.offsets[start]..self.offsets[end]].to_string(),
        };
        self.next_index += 1;
        Some(chunk)
    }
}

/// Iterate a document's chunks lazily.
pub fn chunks(doc: &Document, params: ChunkParams) -> Chunks<'_> {
    Chunks::new(doc, params)
}

/// Split a document into chunks, collected into a `Vec`.
pub fn chunk_document(doc: &Document, params: ChunkParams) -> Vec<Chunk> {
    chunks(doc, params).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc1", text)
    }

    /// Rebuild the text from chunk bodies, dropping each overlap prefix.
    fn reconstruct(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&c.text);
            } else {
                out.extend(c.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let chunks = chunk_document(&doc(""), ChunkParams::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_document(&doc("Hello, world!"), ChunkParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn test_exact_max_size_single_chunk() {
        let text = "x".repeat(DEFAULT_MAX_SIZE);
        let chunks = chunk_document(&doc(&text), ChunkParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_1500_chars_two_windows() {
        let text: String = (0..1500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_document(&doc(&text), ChunkParams::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 1000));
        assert_eq!((chunks[1].start, chunks[1].end), (800, 1500));
        assert_eq!(chunks[0].text, &text[0..1000]);
        assert_eq!(chunks[1].text, &text[800..1500]);
    }

    #[test]
    fn test_overlap_identity_and_reconstruction() {
        let text: String = (0..5321)
            .map(|i| char::from(b'A' + (i * 7 % 26) as u8))
            .collect();
        let params = ChunkParams::new(300, 50).unwrap();
        let chunks = chunk_document(&doc(&text), params);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let suffix: String = prev[prev.len() - 50..].iter().collect();
            let prefix: String = pair[1].text.chars().take(50).collect();
            assert_eq!(suffix, prefix);
        }
        for c in &chunks {
            assert!(c.text.chars().count() <= 300);
        }
        assert_eq!(reconstruct(&chunks, 50), text);
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = "word ".repeat(900);
        let chunks = chunk_document(&doc(&text), ChunkParams::new(100, 10).unwrap());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
            assert_eq!(c.source, "doc1");
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello wörld ✓    │\n└──────────────────┘";
        let params = ChunkParams::new(7, 2).unwrap();
        let chunks = chunk_document(&doc(text), params);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 7);
            assert_eq!(c.text.chars().count(), c.end - c.start);
        }
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let d = doc(&"abcdefghij".repeat(30));
        let params = ChunkParams::new(40, 10).unwrap();
        let mut iter = chunks(&d, params);
        let first = iter.next().unwrap();
        let snapshot = iter.clone();
        let rest_a: Vec<Chunk> = iter.collect();
        let rest_b: Vec<Chunk> = snapshot.collect();
        assert_eq!(first.chunk_index, 0);
        assert_eq!(rest_a, rest_b);
        assert_eq!(chunk_document(&d, params), chunk_document(&d, params));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(100, 100).is_err());
        assert!(ChunkParams::new(100, 150).is_err());
        assert!(ChunkParams::new(100, 0).is_ok());
    }

    #[test]
    fn test_validated_params_always_terminate() {
        let params = ChunkParams::new(1, 0).unwrap();
        assert_eq!((params.max_size(), params.overlap()), (1, 0));
        assert_eq!(chunk_document(&doc("abc"), params).len(), 3);

        let params = ChunkParams::new(5, 4).unwrap();
        let chunks = chunk_document(&doc("abcdefgh"), params);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.last().map(|c| c.end), Some(8));
    }
}
