//! Persistent ANN vector store over chunks with metadata (§4.4).

pub mod lancedb;

pub use lancedb::LanceDbStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::MetadataFilter;
use crate::types::StoreMatch;

/// Name of the on-disk collection the core writes to (§6).
pub const COLLECTION_NAME: &str = "ataraxai_knowledge";

/// Contract satisfied by any persistent ANN backend. All operations are
/// synchronous relative to the caller; the store is responsible for its
/// own on-disk durability.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// `len(metadatas) == len(texts) == len(ids)`. Duplicate ids overwrite.
    /// Embeddings are computed by the injected Embedder before reaching
    /// the store.
    async fn add_chunks(
        &self,
        ids: Vec<String>,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<crate::types::Metadata>,
    ) -> Result<()>;

    /// Cosine-similarity ranked query.
    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoreMatch>>;

    async fn delete_by_ids(&self, ids: &[String]) -> Result<()>;

    async fn delete_by_metadata(&self, filter: &MetadataFilter) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}
