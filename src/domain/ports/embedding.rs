use crate::domain::{errors::DomainError, Embedding};
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds document texts, one unit-length vector per input in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError>;
    async fn embed_query(&self, text: &str) -> Result<Embedding, DomainError>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}
