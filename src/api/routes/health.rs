use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub vector_store: String,
    pub index: String,
    pub embedding_model: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Ready once the vector store answers; a missing index is reported but not fatal.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let index = state.default_index();

    match state.indexes.store().index_exists(index).await {
        Ok(exists) => Ok(Json(ReadinessResponse {
            status: "ready".into(),
            vector_store: "connected".into(),
            index: if exists { "present" } else { "missing" }.into(),
            embedding_model: state.embedding.model_name().into(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "vector store unreachable");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
