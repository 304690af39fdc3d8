use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::{ports::EmbeddingService, DomainError};

use super::compressor::LlmCompressor;
use super::generator::AnswerGenerator;
use super::index::IndexManager;
use super::retriever::Retriever;

/// Per-question retrieval knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub index_name: String,
    pub k: usize,
    pub use_compression: bool,
    pub max_tokens: usize,
}

/// Question answering over an existing index: retrieve, then generate.
///
/// Holds no conversation state; each call is independent of earlier ones.
pub struct ChatService {
    indexes: IndexManager,
    embedding: Arc<dyn EmbeddingService>,
    generator: AnswerGenerator,
    compressor: LlmCompressor,
}

impl ChatService {
    pub fn new(
        indexes: IndexManager,
        embedding: Arc<dyn EmbeddingService>,
        generator: AnswerGenerator,
        compressor: LlmCompressor,
    ) -> Self {
        Self {
            indexes,
            embedding,
            generator,
            compressor,
        }
    }

    #[instrument(skip(self), fields(index = %settings.index_name, k = settings.k))]
    pub async fn answer(
        &self,
        question: &str,
        settings: &RetrievalSettings,
    ) -> Result<String, DomainError> {
        if question.trim().is_empty() {
            return Err(DomainError::validation("question must not be empty"));
        }

        let store = self
            .indexes
            .get_vector_store(Arc::clone(&self.embedding), &settings.index_name)
            .await?;
        let compressor = settings.use_compression.then(|| self.compressor.clone());
        let retriever = Retriever::build(store, settings.k, compressor)?;

        let chunks = retriever.retrieve(question, settings.max_tokens).await?;
        info!(chunks = chunks.len(), "retrieved context");

        self.generator.generate(question, &chunks).await
    }
}
