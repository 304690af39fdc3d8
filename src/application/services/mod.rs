pub mod chat;
pub mod compressor;
pub mod generator;
pub mod index;
pub mod ingestion;
pub mod retriever;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatService, RetrievalSettings};
pub use compressor::LlmCompressor;
pub use generator::{format_context, AnswerGenerator, PromptPolicy};
pub use index::{IndexManager, KnowledgeStore, VectorIndex};
pub use ingestion::{
    FailedFile, IngestionOptions, IngestionReport, IngestionService, IngestionSource,
};
pub use retriever::{apply_token_budget, Retriever};
