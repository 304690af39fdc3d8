mod hashing;
mod local;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{ports::EmbeddingService, DomainError};

pub use hashing::HashingEmbedding;
pub use local::{resolve_model, LocalEmbedding, BGE_SMALL, MINILM};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingModelType {
    /// BGE small (default model `BAAI/bge-small-en-v1.5`).
    Bge,
    /// Any supported sentence-transformer by hub name.
    Huggingface,
    /// Offline feature hashing, no model download.
    Hashing,
}

impl EmbeddingModelType {
    pub fn default_model_name(&self) -> &'static str {
        match self {
            Self::Bge | Self::Huggingface => BGE_SMALL,
            Self::Hashing => "hashing",
        }
    }
}

pub fn build_embedding(
    model_type: EmbeddingModelType,
    model_name: Option<&str>,
) -> Result<Arc<dyn EmbeddingService>, DomainError> {
    match model_type {
        EmbeddingModelType::Hashing => Ok(Arc::new(HashingEmbedding::new())),
        EmbeddingModelType::Bge | EmbeddingModelType::Huggingface => {
            let name = model_name.unwrap_or(model_type.default_model_name());
            Ok(Arc::new(LocalEmbedding::with_model(name)?))
        }
    }
}
