//! Vector index abstraction.
//!
//! The pipeline talks to the index only through [`RetrievalIndex`]; Qdrant is the one
//! backend. When the index is disabled in configuration, [`create_index`] returns `None`
//! and callers use the in-process fallback matcher instead.

mod qdrant;

pub use qdrant::QdrantIndex;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::models::{Config, Document, PayloadFilter, SearchResult};

/// Narrow contract over a vector database.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Create the collection if absent. With `recreate`, an existing collection is
    /// dropped first.
    async fn initialize(&self, vector_size: u64, recreate: bool) -> Result<(), IndexError>;

    /// Insert or replace the point keyed by `document.id`.
    async fn upsert(&self, document: &Document, vector: Vec<f32>) -> Result<(), IndexError>;

    /// Best-first hits. The filter is applied by the index during ranking.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<SearchResult>, IndexError>;

    /// Deleting an id that is not present is not an error.
    async fn delete(&self, id: &str) -> Result<(), IndexError>;

    async fn count(&self) -> Result<u64, IndexError>;

    fn collection(&self) -> &str;
}

/// Build the configured index, or `None` when `qdrant.enabled` is false.
pub fn create_index(config: &Config) -> Result<Option<Arc<dyn RetrievalIndex>>, IndexError> {
    if !config.qdrant.enabled {
        return Ok(None);
    }

    let timeout = Duration::from_secs(config.providers.timeout_secs);
    let index = QdrantIndex::new(&config.qdrant, timeout)?;
    Ok(Some(Arc::new(index)))
}
