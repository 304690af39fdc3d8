//! Application layer - Use cases and orchestration.
//!
//! Services here drive the ingestion and question-answering pipelines through
//! the domain ports; adapters are injected by the binaries.

pub mod services;

pub use services::{
    AnswerGenerator, ChatService, IndexManager, IngestionOptions, IngestionReport,
    IngestionService, IngestionSource, KnowledgeStore, LlmCompressor, PromptPolicy,
    RetrievalSettings, Retriever,
};
