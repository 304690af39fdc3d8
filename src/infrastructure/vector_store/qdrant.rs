use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use uuid::Uuid;

use crate::domain::{
    ports::VectorStore, DocumentChunk, DomainError, Embedding, Metadata, SearchResult,
};
use crate::infrastructure::config::{Credentials, VectorStoreConfig};

const UPSERT_BATCH: usize = 128;

/// Qdrant-backed store; every named index is a collection with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .map_err(map_err)?;
        Ok(Self { client })
    }

    /// Resolves the endpoint and key first so missing credentials surface
    /// before any connection attempt.
    pub fn from_config(
        credentials: &Credentials,
        config: &VectorStoreConfig,
    ) -> Result<Self, DomainError> {
        let (url, api_key) = credentials.require_vector_store(config)?;
        tracing::debug!(url = %url, "connecting to qdrant");
        Self::new(&url, api_key)
    }
}

fn map_err(e: QdrantError) -> DomainError {
    DomainError::external(format!("qdrant: {e}"))
}

fn to_payload(chunk: &DocumentChunk) -> Result<Payload, DomainError> {
    serde_json::json!({
        "chunk_id": chunk.id.to_string(),
        "document_id": chunk.document_id.to_string(),
        "content": chunk.content,
        "chunk_index": chunk.chunk_index,
        "metadata": serde_json::Value::Object(chunk.metadata.clone()),
    })
    .try_into()
    .map_err(|_| DomainError::internal("Failed to create payload"))
}

fn to_json(value: &QdrantValue) -> serde_json::Value {
    match &value.kind {
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => serde_json::json!(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

/// `None` when the identifiers or content are missing or malformed.
fn chunk_from_payload(payload: &HashMap<String, QdrantValue>) -> Option<DocumentChunk> {
    let id: Uuid = string_field(payload, "chunk_id")?.parse().ok()?;
    let document_id: Uuid = string_field(payload, "document_id")?.parse().ok()?;
    let content = string_field(payload, "content")?;
    let chunk_index = match payload.get("chunk_index").and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => *i as usize,
        _ => 0,
    };
    let metadata: Metadata = match payload.get("metadata").map(to_json) {
        Some(serde_json::Value::Object(map)) => map,
        _ => Metadata::new(),
    };

    Some(DocumentChunk {
        id,
        document_id,
        content,
        chunk_index,
        metadata,
    })
}

fn string_field(
    payload: &HashMap<String, QdrantValue>,
    key: &str,
) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError> {
        self.client.collection_exists(index).await.map_err(map_err)
    }

    async fn create_index(&self, index: &str, dimension: usize) -> Result<(), DomainError> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(index)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(map_err)?;

        tracing::debug!(index, dimension, "created qdrant collection");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), DomainError> {
        self.client.delete_collection(index).await.map_err(map_err)?;
        tracing::debug!(index, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(
        &self,
        index: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        for batch in points.chunks(UPSERT_BATCH) {
            let structs = batch
                .iter()
                .map(|(chunk, embedding)| {
                    Ok(PointStruct::new(
                        chunk.id.to_string(),
                        embedding.as_slice().to_vec(),
                        to_payload(chunk)?,
                    ))
                })
                .collect::<Result<Vec<_>, DomainError>>()?;

            self.client
                .upsert_points(UpsertPointsBuilder::new(index, structs).wait(true))
                .await
                .map_err(map_err)?;
        }

        tracing::debug!(index, count = points.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(index, query.as_slice().to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(map_err)?;

        let results = response
            .result
            .into_iter()
            .filter_map(|point| match chunk_from_payload(&point.payload) {
                Some(chunk) => Some(SearchResult {
                    chunk,
                    score: point.score,
                }),
                None => {
                    tracing::warn!(
                        index,
                        point_id = ?point.id,
                        "skipping point without a readable chunk payload"
                    );
                    None
                }
            })
            .collect();

        Ok(results)
    }

    async fn count(&self, index: &str) -> Result<u64, DomainError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(index).exact(true))
            .await
            .map_err(map_err)?;
        Ok(response.result.map(|r| r.count).unwrap_or_default())
    }
}
