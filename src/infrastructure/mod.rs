pub mod config;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod vector_store;

pub use config::{AppConfig, Config, Credentials, PromptsConfig};
pub use embedding::{build_embedding, EmbeddingModelType, HashingEmbedding, LocalEmbedding};
pub use llm::GeminiLlm;
pub use loader::{load_from_directory, load_from_files, LoadFailure, LoadOutcome};
pub use vector_store::{InMemoryVectorStore, QdrantVectorStore};
