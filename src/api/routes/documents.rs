use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::application::{IngestionOptions, IngestionReport, IngestionSource};
use crate::domain::DomainError;
use crate::infrastructure::config::{check_range, chunking_within_limits, limits};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub index_name: Option<String>,
    #[serde(default)]
    pub recreate_index: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchDocumentsRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub index_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResultResponse {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    pub source: Option<String>,
    pub score: f32,
}

/// Knobs shared by JSON and multipart ingestion.
#[derive(Debug, Default)]
struct IngestParams {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    index_name: Option<String>,
    recreate_index: bool,
}

impl IngestParams {
    fn into_options(self, state: &AppState) -> Result<IngestionOptions, DomainError> {
        let defaults = &state.config.config.ingestion;
        let chunking = chunking_within_limits(
            self.chunk_size.unwrap_or(defaults.chunk_size),
            self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
        )?;

        let index_name = self
            .index_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| state.default_index().to_string());

        Ok(IngestionOptions {
            index_name,
            chunking,
            recreate_index: self.recreate_index,
        })
    }
}

pub async fn ingest_documents(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<IngestionReport>> {
    let source = match (request.data_dir, request.paths.is_empty()) {
        (Some(dir), true) => IngestionSource::Directory(dir),
        (None, false) => IngestionSource::Files(request.paths),
        _ => {
            return Err(DomainError::validation(
                "provide exactly one of data_dir or paths",
            )
            .into())
        }
    };

    let options = IngestParams {
        chunk_size: request.chunk_size,
        chunk_overlap: request.chunk_overlap,
        index_name: request.index_name,
        recreate_index: request.recreate_index,
    }
    .into_options(&state)?;

    let report = state.ingestion_service().run(source, &options).await?;
    Ok(Json(report))
}

/// Saves uploaded files into a scratch directory and ingests that directory.
pub async fn upload_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<IngestionReport>> {
    let dir = tempfile::tempdir()
        .map_err(|e| DomainError::internal(format!("cannot create upload dir: {e}")))?;
    let mut params = IngestParams::default();
    let mut saved = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::validation(format!("malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let data = field
                .bytes()
                .await
                .map_err(|e| DomainError::validation(format!("malformed upload: {e}")))?;
            let target = upload_target(dir.path(), &file_name)?;
            tokio::fs::write(&target, &data)
                .await
                .map_err(|e| DomainError::internal(format!("cannot save upload: {e}")))?;
            tracing::debug!(file = %file_name, bytes = data.len(), "saved upload");
            saved += 1;
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| DomainError::validation(format!("malformed upload: {e}")))?;
        match name.as_str() {
            "chunk_size" => params.chunk_size = Some(parse_field(&name, &value)?),
            "chunk_overlap" => params.chunk_overlap = Some(parse_field(&name, &value)?),
            "index_name" => params.index_name = Some(value),
            "recreate_index" => params.recreate_index = parse_field(&name, &value)?,
            _ => tracing::debug!(field = %name, "ignoring unknown upload field"),
        }
    }

    if saved == 0 {
        return Err(DomainError::validation("no files uploaded").into());
    }

    let options = params.into_options(&state)?;
    let report = state
        .ingestion_service()
        .run(IngestionSource::Directory(dir.path().to_path_buf()), &options)
        .await?;
    Ok(Json(report))
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DomainError> {
    value
        .trim()
        .parse()
        .map_err(|_| DomainError::validation(format!("invalid value for {name}: {value}")))
}

/// Keeps only the final path component and avoids clobbering earlier uploads.
fn upload_target(dir: &Path, file_name: &str) -> Result<PathBuf, DomainError> {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DomainError::validation(format!("invalid file name: {file_name}")))?;

    let mut target = dir.join(base);
    let mut n = 1;
    while target.exists() {
        target = dir.join(format!("{n}_{base}"));
        n += 1;
    }
    Ok(target)
}

pub async fn search_documents(
    State(state): State<AppState>,
    Json(request): Json<SearchDocumentsRequest>,
) -> ApiResult<Json<Vec<SearchResultResponse>>> {
    if request.query.trim().is_empty() {
        return Err(ApiError(DomainError::validation("query must not be empty")));
    }
    let limit = request.limit.unwrap_or(state.config.config.rag.top_k);
    check_range("limit", limit, &limits::TOP_K)?;

    let index_name = request
        .index_name
        .unwrap_or_else(|| state.default_index().to_string());
    let store = state
        .indexes
        .get_vector_store(Arc::clone(&state.embedding), &index_name)
        .await?;

    let results = store
        .similarity_search(&request.query, limit)
        .await?
        .into_iter()
        .map(|r| SearchResultResponse {
            chunk_id: r.chunk.id,
            document_id: r.chunk.document_id,
            chunk_index: r.chunk.chunk_index,
            source: r.chunk.source().map(str::to_string),
            content: r.chunk.content,
            score: r.score,
        })
        .collect();

    Ok(Json(results))
}
