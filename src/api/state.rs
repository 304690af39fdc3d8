use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::{
    AnswerGenerator, ChatService, IndexManager, IngestionService, LlmCompressor,
    RetrievalSettings,
};
use crate::domain::{
    ports::{EmbeddingService, LlmService, VectorStore},
    Conversation, DomainError,
};
use crate::infrastructure::config::{check_range, limits};
use crate::infrastructure::{AppConfig, Credentials, GeminiLlm};

/// Pipeline stage a chat model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRole {
    Generation,
    Compression,
}

/// Builds the chat model for one stage of a request, optionally overriding
/// the configured model name.
pub type LlmProvider = Arc<
    dyn Fn(LlmRole, Option<&str>) -> Result<Arc<dyn LlmService>, DomainError> + Send + Sync,
>;

pub type Conversations = Arc<RwLock<HashMap<Uuid, Conversation>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub indexes: IndexManager,
    pub embedding: Arc<dyn EmbeddingService>,
    pub conversations: Conversations,
    llm_provider: LlmProvider,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        credentials: Credentials,
        store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingService>,
    ) -> Self {
        let llm_config = config.config.llm.clone();
        let llm_provider: LlmProvider = Arc::new(
            move |role: LlmRole, model: Option<&str>| -> Result<Arc<dyn LlmService>, DomainError> {
                let mut llm = GeminiLlm::new(&credentials, &llm_config)?;
                if let Some(model) = model {
                    llm = llm.with_model(model);
                }
                if role == LlmRole::Compression {
                    llm = llm.with_temperature(llm_config.compression_temperature);
                }
                Ok(Arc::new(llm))
            },
        );

        let deletion = &config.config.vector_store;
        let indexes = IndexManager::new(store).with_deletion_wait(
            Duration::from_millis(deletion.deletion_poll_interval_ms),
            Duration::from_secs(deletion.deletion_timeout_seconds),
        );

        Self {
            config: Arc::new(config),
            indexes,
            embedding,
            conversations: Arc::new(RwLock::new(HashMap::new())),
            llm_provider,
        }
    }

    pub fn with_llm_provider(mut self, provider: LlmProvider) -> Self {
        self.llm_provider = provider;
        self
    }

    pub fn default_index(&self) -> &str {
        &self.config.config.vector_store.index_name
    }

    pub fn ingestion_service(&self) -> IngestionService {
        IngestionService::new(self.indexes.clone(), Arc::clone(&self.embedding))
    }

    /// Wires retrieval, compression and generation, one chat model per stage.
    pub fn chat_service(&self, model: Option<&str>) -> Result<ChatService, DomainError> {
        let llm = (self.llm_provider)(LlmRole::Generation, model)?;
        let compression_llm = (self.llm_provider)(LlmRole::Compression, model)?;
        let prompts = &self.config.prompts;
        let policy = self.config.config.rag.prompt_policy;

        let generator = AnswerGenerator::new(
            llm,
            policy,
            prompts.generator.template_for(policy),
            prompts.generator.insufficient_context.clone(),
        );
        let compressor = LlmCompressor::new(
            compression_llm,
            prompts.compressor.template.clone(),
            prompts.compressor.no_output.clone(),
        );

        Ok(ChatService::new(
            self.indexes.clone(),
            Arc::clone(&self.embedding),
            generator,
            compressor,
        ))
    }

    /// Request overrides on top of the configured defaults, range-checked.
    pub fn retrieval_settings(
        &self,
        k: Option<usize>,
        use_compression: Option<bool>,
        max_tokens: Option<usize>,
        index_name: Option<String>,
    ) -> Result<RetrievalSettings, DomainError> {
        let rag = &self.config.config.rag;
        let k = k.unwrap_or(rag.top_k);
        check_range("k", k, &limits::TOP_K)?;

        let max_tokens = max_tokens.unwrap_or(rag.max_tokens);
        if max_tokens == 0 {
            return Err(DomainError::validation("max_tokens must be positive"));
        }

        Ok(RetrievalSettings {
            index_name: index_name.unwrap_or_else(|| self.default_index().to_string()),
            k,
            use_compression: use_compression.unwrap_or(rag.use_compression),
            max_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::application::services::testing::ScriptedLlm;
    use crate::infrastructure::{HashingEmbedding, InMemoryVectorStore};

    #[test]
    fn test_chat_service_builds_a_model_per_stage() {
        let calls: Arc<Mutex<Vec<(LlmRole, Option<String>)>>> = Arc::default();
        let recorded = Arc::clone(&calls);
        let provider: LlmProvider = Arc::new(
            move |role: LlmRole, model: Option<&str>| -> Result<Arc<dyn LlmService>, DomainError> {
                recorded
                    .lock()
                    .unwrap()
                    .push((role, model.map(str::to_string)));
                Ok(Arc::new(ScriptedLlm::new(Vec::<String>::new())))
            },
        );
        let state = AppState::new(
            AppConfig::default(),
            Credentials::default(),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashingEmbedding::new()),
        )
        .with_llm_provider(provider);

        assert!(state.chat_service(Some("gemini-pro")).is_ok());

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                (LlmRole::Generation, Some("gemini-pro".to_string())),
                (LlmRole::Compression, Some("gemini-pro".to_string())),
            ]
        );
    }

    #[test]
    fn test_k_outside_range_rejected() {
        let state = AppState::new(
            AppConfig::default(),
            Credentials::default(),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashingEmbedding::new()),
        );

        assert!(state.retrieval_settings(Some(0), None, None, None).is_err());
        let settings = state.retrieval_settings(None, None, None, None).unwrap();
        assert_eq!(settings.k, 5);
        assert_eq!(settings.index_name, "personal-knowledge-assistant");
    }
}
