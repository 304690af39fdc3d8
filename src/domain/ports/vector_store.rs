use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult};
use async_trait::async_trait;

/// A vector database holding named indexes of chunk vectors compared by cosine.
///
/// Index deletion may be asynchronous on the backend: `index_exists` can keep
/// reporting `true` for a while after `delete_index` returns.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError>;
    async fn create_index(&self, index: &str, dimension: usize) -> Result<(), DomainError>;
    async fn delete_index(&self, index: &str) -> Result<(), DomainError>;
    async fn upsert(
        &self,
        index: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError>;
    async fn search(
        &self,
        index: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;
    async fn count(&self, index: &str) -> Result<u64, DomainError>;
}
