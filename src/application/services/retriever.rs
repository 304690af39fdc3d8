use tracing::{debug, instrument};

use crate::domain::{DocumentChunk, DomainError};

use super::compressor::LlmCompressor;
use super::index::KnowledgeStore;

/// Top-k similarity retriever with optional LLM compression.
#[derive(Clone)]
pub struct Retriever {
    store: KnowledgeStore,
    k: usize,
    compressor: Option<LlmCompressor>,
}

impl Retriever {
    pub fn build(
        store: KnowledgeStore,
        k: usize,
        compressor: Option<LlmCompressor>,
    ) -> Result<Self, DomainError> {
        if k == 0 {
            return Err(DomainError::validation("k must be at least 1"));
        }
        Ok(Self {
            store,
            k,
            compressor,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn uses_compression(&self) -> bool {
        self.compressor.is_some()
    }

    /// Chunks relevant to `query` in similarity order, cut to `max_tokens`
    /// and tagged with their source.
    #[instrument(skip(self), fields(k = self.k, compression = self.uses_compression()))]
    pub async fn retrieve(
        &self,
        query: &str,
        max_tokens: usize,
    ) -> Result<Vec<DocumentChunk>, DomainError> {
        let hits = self.store.similarity_search(query, self.k).await?;
        debug!(hits = hits.len(), "similarity search done");

        let mut chunks: Vec<DocumentChunk> = hits.into_iter().map(|r| r.chunk).collect();
        if let Some(compressor) = &self.compressor {
            chunks = compressor.compress(query, chunks).await?;
        }

        Ok(apply_token_budget(chunks, max_tokens))
    }
}

/// Keeps the longest prefix whose estimated token total fits `max_tokens`.
///
/// Accumulation stops at the first chunk that would overflow, even if a later,
/// smaller chunk would fit. Retained chunks get a `Source:` line appended; the
/// budget is measured before that line is added.
pub fn apply_token_budget(chunks: Vec<DocumentChunk>, max_tokens: usize) -> Vec<DocumentChunk> {
    let mut used = 0;
    let mut kept = Vec::new();

    for (i, chunk) in chunks.into_iter().enumerate() {
        let tokens = chunk.estimated_tokens();
        if used + tokens > max_tokens {
            debug!(kept = kept.len(), used, "token budget reached");
            break;
        }
        used += tokens;
        kept.push(with_source_line(chunk, i));
    }

    kept
}

fn with_source_line(mut chunk: DocumentChunk, position: usize) -> DocumentChunk {
    let source = chunk
        .source()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Document {}", position + 1));
    chunk.content = format!("{}\n\nSource: {source}", chunk.content);
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::services::index::IndexManager;
    use crate::application::services::testing::ScriptedLlm;
    use crate::domain::ports::EmbeddingService;
    use crate::domain::{metadata_keys, Metadata};
    use crate::infrastructure::{HashingEmbedding, InMemoryVectorStore};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn chunk_of_len(chars: usize) -> DocumentChunk {
        DocumentChunk::new(Uuid::new_v4(), "x".repeat(chars), 0)
    }

    #[test]
    fn test_budget_stops_at_first_overflow() {
        let chunks = vec![chunk_of_len(40), chunk_of_len(80), chunk_of_len(4)];
        // 10 + 20 > 25, so the 1-token chunk after it is not considered
        let kept = apply_token_budget(chunks, 25);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_source_attribution() {
        let mut metadata = Metadata::new();
        metadata.insert(metadata_keys::SOURCE.into(), "/notes/plan.md".into());
        let sourced = DocumentChunk::new(Uuid::new_v4(), "alpha", 0).with_metadata(metadata);
        let anonymous = DocumentChunk::new(Uuid::new_v4(), "beta", 0);

        let kept = apply_token_budget(vec![sourced, anonymous], 100);

        assert_eq!(kept[0].content, "alpha\n\nSource: /notes/plan.md");
        assert_eq!(kept[1].content, "beta\n\nSource: Document 2");
    }

    #[test]
    fn test_zero_budget_keeps_only_tiny_chunks() {
        let kept = apply_token_budget(vec![chunk_of_len(3), chunk_of_len(4)], 0);
        assert_eq!(kept.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_budget_is_tight_prefix(
            lens in proptest::collection::vec(0usize..400, 0..12),
            budget in 0usize..300,
        ) {
            let chunks: Vec<_> = lens.iter().map(|&n| chunk_of_len(n)).collect();
            let kept = apply_token_budget(chunks, budget);

            let used: usize = lens[..kept.len()].iter().map(|n| n / 4).sum();
            prop_assert!(used <= budget);
            if kept.len() < lens.len() {
                prop_assert!(used + lens[kept.len()] / 4 > budget);
            }
        }
    }

    async fn store_with(texts: &[&str]) -> KnowledgeStore {
        let manager = IndexManager::new(Arc::new(InMemoryVectorStore::new()));
        let embedder: Arc<dyn EmbeddingService> = Arc::new(HashingEmbedding::new());
        let doc = Uuid::new_v4();
        let chunks: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentChunk::new(doc, *t, i))
            .collect();
        manager.create_vector_store(&chunks, embedder, "kb").await.unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_similarity() {
        let store = store_with(&[
            "The boiler was serviced in March.",
            "Garden hose storage.",
            "Car insurance renewal is due in June.",
        ])
        .await;
        let retriever = Retriever::build(store, 2, None).unwrap();

        let chunks = retriever.retrieve("When is car insurance renewal due?", 4000).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].content.starts_with("Car insurance renewal is due in June."));
        assert!(chunks[0].content.ends_with("Source: Document 1"));
    }

    #[tokio::test]
    async fn test_retrieve_with_compression() {
        let store = store_with(&["Car insurance renewal is due in June. The car is blue."]).await;
        let llm = Arc::new(ScriptedLlm::new(["Car insurance renewal is due in June."]));
        let compressor = LlmCompressor::new(llm, "{question}\n{context}", "NO_OUTPUT");
        let retriever = Retriever::build(store, 3, Some(compressor)).unwrap();

        let chunks = retriever.retrieve("insurance renewal", 4000).await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].content,
            "Car insurance renewal is due in June.\n\nSource: Document 1"
        );
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let store = store_with(&["a"]).await;
        assert!(Retriever::build(store, 0, None).is_err());
    }
}
