use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::domain::{
    chunk_documents, ports::EmbeddingService, ChunkingOptions, DocumentChunk, DomainError,
};
use crate::infrastructure::loader::{self, LoadOutcome};

use super::index::{IndexManager, KnowledgeStore};

#[derive(Debug, Clone)]
pub enum IngestionSource {
    Directory(PathBuf),
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub index_name: String,
    pub chunking: ChunkingOptions,
    /// Deletes the index up front. Every build starts from an empty index anyway.
    pub recreate_index: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub index_name: String,
    pub embedding_model: String,
    pub documents_loaded: usize,
    pub files_failed: Vec<FailedFile>,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub vectors_indexed: u64,
}

/// Load, chunk, embed and index, one stage after another.
///
/// The stages are public so callers can report progress between them.
pub struct IngestionService {
    indexes: IndexManager,
    embedding: Arc<dyn EmbeddingService>,
}

impl IngestionService {
    pub fn new(indexes: IndexManager, embedding: Arc<dyn EmbeddingService>) -> Self {
        Self { indexes, embedding }
    }

    #[instrument(skip(self))]
    pub async fn load(&self, source: IngestionSource) -> Result<LoadOutcome, DomainError> {
        tokio::task::spawn_blocking(move || match source {
            IngestionSource::Directory(dir) => loader::load_from_directory(&dir),
            IngestionSource::Files(paths) => Ok(loader::load_from_files(&paths)),
        })
        .await
        .map_err(|e| DomainError::internal(format!("loader task failed: {e}")))?
    }

    pub fn chunk(&self, outcome: &LoadOutcome, options: &ChunkingOptions) -> Vec<DocumentChunk> {
        let chunks = chunk_documents(&outcome.documents, options);
        info!(
            documents = outcome.documents.len(),
            chunks = chunks.len(),
            chunk_size = options.chunk_size,
            chunk_overlap = options.chunk_overlap,
            "chunked documents"
        );
        chunks
    }

    pub async fn index(
        &self,
        chunks: &[DocumentChunk],
        index_name: &str,
    ) -> Result<KnowledgeStore, DomainError> {
        self.indexes
            .create_vector_store(chunks, Arc::clone(&self.embedding), index_name)
            .await
    }

    #[instrument(skip(self, options), fields(index = %options.index_name))]
    pub async fn run(
        &self,
        source: IngestionSource,
        options: &IngestionOptions,
    ) -> Result<IngestionReport, DomainError> {
        let outcome = self.load(source).await?;
        let chunks = self.chunk(&outcome, &options.chunking);

        if options.recreate_index {
            self.indexes.delete_index(&options.index_name).await?;
        }

        let store = self.index(&chunks, &options.index_name).await?;
        let vectors_indexed = store.index().count().await?;

        let report = IngestionReport {
            index_name: options.index_name.clone(),
            embedding_model: self.embedding.model_name().to_string(),
            documents_loaded: outcome.documents.len(),
            files_failed: outcome
                .failures
                .iter()
                .map(|f| FailedFile {
                    path: f.path.display().to_string(),
                    error: f.error.clone(),
                })
                .collect(),
            files_skipped: outcome.skipped.len(),
            chunks_created: chunks.len(),
            vectors_indexed,
        };

        info!(
            documents = report.documents_loaded,
            failed = report.files_failed.len(),
            chunks = report.chunks_created,
            vectors = report.vectors_indexed,
            "ingestion complete"
        );
        Ok(report)
    }
}
