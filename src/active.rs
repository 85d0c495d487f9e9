//! Owner of the single active index.
//!
//! Queries take a cheap [`Arc`] snapshot under a short read lock and then
//! search without holding it. Installing a new index takes the write lock
//! only for the pointer swap, so an index is never observed half-built and
//! concurrent queries proceed in parallel against a stable snapshot.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{KbError, Result};
use crate::index::EmbeddingIndex;

#[derive(Debug, Default)]
pub struct ActiveIndex {
    slot: RwLock<Option<Arc<EmbeddingIndex>>>,
}

impl ActiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current index, or [`KbError::NotBuilt`].
    pub async fn snapshot(&self) -> Result<Arc<EmbeddingIndex>> {
        self.slot.read().await.clone().ok_or(KbError::NotBuilt)
    }

    /// Install `index`, returning the one it replaced.
    pub async fn replace(&self, index: EmbeddingIndex) -> Option<Arc<EmbeddingIndex>> {
        let mut slot = self.slot.write().await;
        slot.replace(Arc::new(index))
    }

    pub async fn is_built(&self) -> bool {
        self.slot.read().await.is_some()
    }
}
