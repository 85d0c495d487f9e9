//! Error kinds surfaced by the knowledge base engine.
//!
//! Every operation of the core returns [`KbError`]. Errors propagate to the
//! caller unmodified: the engine never retries and never substitutes an
//! empty result for a failure. Application edges (CLI, config loading,
//! server start-up) wrap these in `anyhow` with added context.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a knowledge base operation.
#[derive(Debug, Error)]
pub enum KbError {
    /// A file could not be read or parsed by its format loader.
    #[error("failed to load {}: {message}", path.display())]
    Load { path: PathBuf, message: String },

    /// The embedding service failed, at build time or for a query.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// A query was issued before any index was built.
    #[error("knowledge base not initialized: build it from documents first")]
    NotBuilt,

    /// The generation service failed or returned an error status.
    #[error("generation service error: {0}")]
    GenerationService(String),

    /// The persisted index directory could not be written or read.
    #[error("index storage error: {0}")]
    Storage(String),

    /// Invalid parameters, or an embedder that does not match a persisted index.
    #[error("configuration error: {0}")]
    Config(String),
}

impl KbError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        KbError::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            KbError::Load { .. } => "load_error",
            KbError::EmbeddingService(_) => "embedding_error",
            KbError::NotBuilt => "not_built",
            KbError::GenerationService(_) => "generation_error",
            KbError::Storage(_) => "storage_error",
            KbError::Config(_) => "config_error",
        }
    }
}

impl From<sqlx::Error> for KbError {
    fn from(err: sqlx::Error) -> Self {
        KbError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for KbError {
    fn from(err: std::io::Error) -> Self {
        KbError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_built_message() {
        let msg = KbError::NotBuilt.to_string();
        assert!(msg.contains("not initialized"));
    }

    #[test]
    fn test_load_error_names_path() {
        let err = KbError::load("docs/spec.md", "permission denied");
        assert_eq!(
            err.to_string(),
            "failed to load docs/spec.md: permission denied"
        );
        assert_eq!(err.code(), "load_error");
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: KbError = io.into();
        assert!(matches!(err, KbError::Storage(_)));
    }
}
