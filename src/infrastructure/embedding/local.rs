use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::domain::{ports::EmbeddingService, DomainError, Embedding, EMBEDDING_DIMENSION};

pub const BGE_SMALL: &str = "BAAI/bge-small-en-v1.5";
pub const MINILM: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Sentence-embedding model running on the local CPU through ONNX Runtime.
///
/// The model handle needs exclusive access while embedding, so it sits behind
/// a mutex and every call runs on the blocking pool.
pub struct LocalEmbedding {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
}

impl LocalEmbedding {
    pub fn new() -> Result<Self, DomainError> {
        Self::with_model(BGE_SMALL)
    }

    /// Loads one of the supported 384-dimension models by its hub name.
    pub fn with_model(model_name: &str) -> Result<Self, DomainError> {
        let kind = resolve_model(model_name)?;

        let model = TextEmbedding::try_new(
            InitOptions::new(kind).with_show_download_progress(false),
        )
        .map_err(|e| DomainError::external(format!("failed to load {model_name}: {e}")))?;

        tracing::info!(model = model_name, "embedding model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: model_name.to_string(),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>, DomainError> {
        let model = self.model.clone();

        let raw = tokio::task::spawn_blocking(move || {
            let mut te = model
                .lock()
                .map_err(|e| DomainError::internal(e.to_string()))?;
            te.embed(texts, None)
                .map_err(|e| DomainError::external(e.to_string()))
        })
        .await
        .map_err(|e| DomainError::internal(e.to_string()))??;

        Ok(raw.into_iter().map(Embedding::normalized).collect())
    }
}

/// Maps a hub model name (or its short form) to a bundled model.
pub fn resolve_model(model_name: &str) -> Result<EmbeddingModel, DomainError> {
    let short = model_name.rsplit('/').next().unwrap_or(model_name);
    match short.to_ascii_lowercase().as_str() {
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        _ => Err(DomainError::configuration(format!(
            "unsupported embedding model '{model_name}' (supported: {BGE_SMALL}, {MINILM})"
        ))),
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .run(texts.iter().map(|t| t.to_string()).collect())
            .await?;

        if embeddings.len() != texts.len() {
            return Err(DomainError::internal(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding, DomainError> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::internal("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
