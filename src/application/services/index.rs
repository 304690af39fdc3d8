use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::domain::{
    ports::{EmbeddingService, VectorStore},
    DocumentChunk, DomainError, Embedding, SearchResult,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_DELETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of named vector indexes: create, recreate, delete and bulk load.
#[derive(Clone)]
pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    poll_interval: Duration,
    deletion_timeout: Duration,
}

impl IndexManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deletion_timeout: DEFAULT_DELETION_TIMEOUT,
        }
    }

    pub fn with_deletion_wait(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.deletion_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Deletes `name` if it exists and waits until the backend stops reporting it.
    /// Missing indexes are not an error.
    #[instrument(skip(self))]
    pub async fn delete_index(&self, name: &str) -> Result<(), DomainError> {
        if !self.store.index_exists(name).await? {
            debug!(index = name, "index absent, nothing to delete");
            return Ok(());
        }

        match self.store.delete_index(name).await {
            Ok(()) | Err(DomainError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let wait = async {
            loop {
                if !self.store.index_exists(name).await? {
                    return Ok::<_, DomainError>(());
                }
                debug!(index = name, "index still present, waiting");
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.deletion_timeout, wait)
            .await
            .map_err(|_| {
                DomainError::timeout(format!(
                    "index '{name}' still exists after {:?}",
                    self.deletion_timeout
                ))
            })??;

        info!(index = name, "deleted index");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_or_create_index(
        &self,
        name: &str,
        dimension: usize,
        force_recreate: bool,
    ) -> Result<VectorIndex, DomainError> {
        if force_recreate {
            self.delete_index(name).await?;
        }

        if self.store.index_exists(name).await? {
            debug!(index = name, "reusing existing index");
        } else {
            self.store.create_index(name, dimension).await?;
            info!(index = name, dimension, "created index");
        }

        Ok(VectorIndex {
            store: Arc::clone(&self.store),
            name: name.to_string(),
            dimension,
        })
    }

    /// Full rebuild: drops any index called `name`, then embeds and loads every chunk.
    #[instrument(skip(self, chunks, embedding), fields(chunks = chunks.len()))]
    pub async fn create_vector_store(
        &self,
        chunks: &[DocumentChunk],
        embedding: Arc<dyn EmbeddingService>,
        name: &str,
    ) -> Result<KnowledgeStore, DomainError> {
        let index = self
            .get_or_create_index(name, embedding.dimension(), true)
            .await?;

        if !chunks.is_empty() {
            let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
            let vectors = embedding.embed(&texts).await?;
            if vectors.len() != chunks.len() {
                return Err(DomainError::internal(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                )));
            }

            let points: Vec<(DocumentChunk, Embedding)> =
                chunks.iter().cloned().zip(vectors).collect();
            index.upsert(&points).await?;
        }

        info!(index = name, vectors = chunks.len(), model = embedding.model_name(), "built vector store");
        Ok(KnowledgeStore { index, embedding })
    }

    /// Attaches to an existing index without touching its contents.
    #[instrument(skip(self, embedding))]
    pub async fn get_vector_store(
        &self,
        embedding: Arc<dyn EmbeddingService>,
        name: &str,
    ) -> Result<KnowledgeStore, DomainError> {
        if !self.store.index_exists(name).await? {
            return Err(DomainError::not_found(format!("index '{name}' does not exist")));
        }

        Ok(KnowledgeStore {
            index: VectorIndex {
                store: Arc::clone(&self.store),
                name: name.to_string(),
                dimension: embedding.dimension(),
            },
            embedding,
        })
    }
}

/// Handle to one named index.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    name: String,
    dimension: usize,
}

impl VectorIndex {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn upsert(&self, points: &[(DocumentChunk, Embedding)]) -> Result<(), DomainError> {
        self.store.upsert(&self.name, points).await
    }

    pub async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        self.store.search(&self.name, query, top_k).await
    }

    pub async fn count(&self) -> Result<u64, DomainError> {
        self.store.count(&self.name).await
    }
}

/// An index paired with the embedder its vectors came from.
#[derive(Clone)]
pub struct KnowledgeStore {
    index: VectorIndex,
    embedding: Arc<dyn EmbeddingService>,
}

impl KnowledgeStore {
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedding(&self) -> &Arc<dyn EmbeddingService> {
        &self.embedding
    }

    #[instrument(skip(self), fields(index = %self.index.name))]
    pub async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let vector = self.embedding.embed_query(query).await?;
        self.index.search(&vector, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{HashingEmbedding, InMemoryVectorStore};
    use uuid::Uuid;

    fn manager(store: Arc<InMemoryVectorStore>) -> IndexManager {
        IndexManager::new(store)
            .with_deletion_wait(Duration::from_millis(1), Duration::from_secs(5))
    }

    fn chunks(texts: &[&str]) -> Vec<DocumentChunk> {
        let doc = Uuid::new_v4();
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentChunk::new(doc, *t, i))
            .collect()
    }

    #[tokio::test]
    async fn test_delete_missing_index_twice_is_ok() {
        let manager = manager(Arc::new(InMemoryVectorStore::new()));
        manager.delete_index("ghost").await.unwrap();
        manager.delete_index("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_waits_for_lagging_backend() {
        let store = Arc::new(InMemoryVectorStore::new().with_deletion_lag(3));
        let manager = manager(Arc::clone(&store));
        manager.get_or_create_index("docs", 8, false).await.unwrap();

        manager.delete_index("docs").await.unwrap();

        assert!(!store.index_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_times_out_when_index_never_disappears() {
        let store = Arc::new(InMemoryVectorStore::new().with_deletion_lag(u32::MAX));
        let manager = IndexManager::new(Arc::clone(&store) as Arc<dyn VectorStore>)
            .with_deletion_wait(Duration::from_millis(1), Duration::from_millis(30));
        store.create_index("docs", 8).await.unwrap();

        let err = manager.delete_index("docs").await.unwrap_err();
        assert!(matches!(err, DomainError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing_index() {
        let store = Arc::new(InMemoryVectorStore::new());
        let manager = manager(Arc::clone(&store));
        let embedder = HashingEmbedding::new();

        let first = manager.get_or_create_index("x", 384, false).await.unwrap();
        let point = DocumentChunk::new(Uuid::new_v4(), "kept", 0);
        first
            .upsert(&[(point, embedder.embed_text("kept"))])
            .await
            .unwrap();

        let second = manager.get_or_create_index("x", 384, false).await.unwrap();

        assert_eq!(store.creation_count(), 1);
        assert_eq!(second.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_force_recreate_empties_index() {
        let store = Arc::new(InMemoryVectorStore::new().with_deletion_lag(2));
        let manager = manager(Arc::clone(&store));
        let embedder = HashingEmbedding::new();

        let index = manager.get_or_create_index("x", 384, false).await.unwrap();
        let point = DocumentChunk::new(Uuid::new_v4(), "old", 0);
        index.upsert(&[(point, embedder.embed_text("old"))]).await.unwrap();

        let index = manager.get_or_create_index("x", 384, true).await.unwrap();

        assert_eq!(store.creation_count(), 2);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_vector_store_rebuilds_from_scratch() {
        let store = Arc::new(InMemoryVectorStore::new().with_deletion_lag(1));
        let manager = manager(Arc::clone(&store));
        let embedder: Arc<dyn EmbeddingService> = Arc::new(HashingEmbedding::new());

        manager
            .create_vector_store(&chunks(&["a", "b", "c"]), Arc::clone(&embedder), "kb")
            .await
            .unwrap();
        let rebuilt = manager
            .create_vector_store(&chunks(&["solar panels", "tax filing"]), Arc::clone(&embedder), "kb")
            .await
            .unwrap();

        assert_eq!(rebuilt.index().count().await.unwrap(), 2);
        let hits = rebuilt.similarity_search("solar", 1).await.unwrap();
        assert_eq!(hits[0].chunk.content, "solar panels");
    }

    #[tokio::test]
    async fn test_get_vector_store_requires_existing_index() {
        let store = Arc::new(InMemoryVectorStore::new());
        let manager = manager(Arc::clone(&store));
        let embedder: Arc<dyn EmbeddingService> = Arc::new(HashingEmbedding::new());

        let err = manager
            .get_vector_store(Arc::clone(&embedder), "kb")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::NotFound(_)));

        store.create_index("kb", 384).await.unwrap();
        let attached = manager.get_vector_store(embedder, "kb").await.unwrap();
        assert_eq!(attached.index().count().await.unwrap(), 0);
        assert_eq!(store.creation_count(), 1);
    }
}
