use std::net::SocketAddr;
use std::sync::Arc;

use knowledge_assistant::api::{create_router, AppState};
use knowledge_assistant::infrastructure::{
    build_embedding, AppConfig, Credentials, QdrantVectorStore,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=debug,knowledge_assistant=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = AppConfig::load()?;
    let credentials = Credentials::from_env();
    info!(?credentials, "configuration loaded");

    let store = Arc::new(QdrantVectorStore::from_config(
        &credentials,
        &app_config.config.vector_store,
    )?);

    let embedding_config = app_config.config.embedding.clone();
    let embedding = tokio::task::spawn_blocking(move || {
        build_embedding(
            embedding_config.model_type,
            embedding_config.model_name.as_deref(),
        )
    })
    .await??;
    if embedding.dimension() != app_config.config.embedding.dimension {
        warn!(
            configured = app_config.config.embedding.dimension,
            actual = embedding.dimension(),
            "embedding dimension differs from configuration"
        );
    }
    info!(model = embedding.model_name(), "embedding model ready");

    let server = &app_config.config.server;
    let addr = SocketAddr::new(server.host.parse()?, server.port);

    let state = AppState::new(app_config, credentials, store, embedding);
    let app = create_router(state);

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
