//! # QA Harness
//!
//! A documentation-grounded test generation engine.
//!
//! Project documents are split into overlapping chunks, embedded, and kept
//! in a single active vector index. Requests for test cases or automation
//! scripts retrieve the most similar chunks and hand them, with the request,
//! to a text generation model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────┐   ┌──────────┐   ┌──────────────┐
//! │ Loaders  │──▶│ Chunk │──▶│ Embedder │──▶│ EmbeddingIdx │──▶ index.sqlite
//! │ md/txt/… │   └───────┘   └──────────┘   └──────┬───────┘
//! └──────────┘                                     │ ActiveIndex
//!                                                  ▼
//!                 ┌──────────┐   prompt    ┌─────────────┐
//!    request ────▶│Retriever │────────────▶│  Generator  │──▶ raw text
//!                 └──────────┘             └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`knowledge`] | Build and query orchestration |
//! | [`loader`] | Per-format document loading |
//! | [`chunk`] | Overlapping fixed-size chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Text generation provider abstraction |
//! | [`index`] | In-memory vector index and similarity search |
//! | [`store`] | SQLite persistence of the index |
//! | [`active`] | The single active index slot |
//! | [`retriever`] | Query-time top-k retrieval |
//! | [`prompt`] | Prompt templates |
//! | [`files`] | Input discovery for directory builds |
//! | [`server`] | HTTP API |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error kinds |

pub mod active;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod files;
pub mod generation;
mod http;
pub mod index;
pub mod knowledge;
pub mod loader;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod server;
pub mod store;
