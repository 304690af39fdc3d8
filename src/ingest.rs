use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knowledge_assistant::application::{IndexManager, IngestionService, IngestionSource};
use knowledge_assistant::domain::ChunkingOptions;
use knowledge_assistant::infrastructure::{
    build_embedding, AppConfig, Credentials, EmbeddingModelType, QdrantVectorStore,
};

/// Load, chunk, embed and index a directory of documents.
#[derive(Parser, Debug)]
#[command(name = "ingest", version, about)]
struct Args {
    /// Directory containing documents
    #[arg(long)]
    data_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = EmbeddingModelType::Bge)]
    embedding_model_type: EmbeddingModelType,

    /// Embedding model name; defaults to the model type's standard model
    #[arg(long)]
    embedding_model_name: Option<String>,

    #[arg(long, default_value = "personal-knowledge-assistant")]
    index_name: String,

    /// Target chunk length in characters
    #[arg(long, default_value_t = 512)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = 50)]
    chunk_overlap: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest=info,knowledge_assistant=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    // Everything that can be rejected without I/O is checked first.
    let chunking = ChunkingOptions::new(args.chunk_size, args.chunk_overlap)?;
    let app_config = AppConfig::load()?;
    let credentials = Credentials::from_env();
    let vector_config = &app_config.config.vector_store;
    let store = Arc::new(QdrantVectorStore::from_config(&credentials, vector_config)?);
    let indexes = IndexManager::new(store).with_deletion_wait(
        Duration::from_millis(vector_config.deletion_poll_interval_ms),
        Duration::from_secs(vector_config.deletion_timeout_seconds),
    );

    let model_type = args.embedding_model_type;
    let model_name = args.embedding_model_name.clone();
    println!(
        "Initializing embeddings with {}...",
        model_name
            .as_deref()
            .unwrap_or(model_type.default_model_name())
    );
    let embedding = tokio::task::spawn_blocking(move || {
        build_embedding(model_type, model_name.as_deref())
    })
    .await??;
    let service = IngestionService::new(indexes, embedding);

    println!("Loading documents from {}...", args.data_dir.display());
    let outcome = service
        .load(IngestionSource::Directory(args.data_dir.clone()))
        .await?;
    println!(
        "Loaded {} documents ({} files failed, {} skipped).",
        outcome.documents.len(),
        outcome.failures.len(),
        outcome.skipped.len()
    );
    for failure in &outcome.failures {
        eprintln!("  failed: {}: {}", failure.path.display(), failure.error);
    }

    println!("Preprocessing and chunking documents...");
    let chunks = service.chunk(&outcome, &chunking);
    println!("Created {} chunks.", chunks.len());

    println!("Creating vector store '{}'...", args.index_name);
    let store = service.index(&chunks, &args.index_name).await?;
    let vectors = store.index().count().await?;
    println!(
        "Vector store created with index name: {} ({} vectors)",
        args.index_name, vectors
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["ingest", "--data-dir", "docs"]).unwrap();
        assert_eq!(args.data_dir, PathBuf::from("docs"));
        assert_eq!(args.embedding_model_type, EmbeddingModelType::Bge);
        assert_eq!(args.index_name, "personal-knowledge-assistant");
        assert_eq!(args.chunk_size, 512);
        assert_eq!(args.chunk_overlap, 50);
        assert!(args.embedding_model_name.is_none());
    }

    #[test]
    fn test_data_dir_required() {
        assert!(Args::try_parse_from(["ingest"]).is_err());
    }

    #[test]
    fn test_model_type_values() {
        let args = Args::try_parse_from([
            "ingest",
            "--data-dir",
            "docs",
            "--embedding-model-type",
            "huggingface",
            "--embedding-model-name",
            "sentence-transformers/all-MiniLM-L6-v2",
        ])
        .unwrap();
        assert_eq!(args.embedding_model_type, EmbeddingModelType::Huggingface);

        assert!(Args::try_parse_from([
            "ingest",
            "--data-dir",
            "docs",
            "--embedding-model-type",
            "word2vec",
        ])
        .is_err());
    }
}
