use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata carried from a source file down to its chunks.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub mod metadata_keys {
    pub const SOURCE: &str = "source";
    pub const FILE_NAME: &str = "file_name";
    pub const PAGE: &str = "page";
    pub const CHUNK_INDEX: &str = "chunk_index";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub content_type: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content: content.into(),
            content_type: "text/plain".to_string(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.insert(
            metadata_keys::SOURCE.to_string(),
            serde_json::Value::String(source.into()),
        );
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.metadata
            .insert(metadata_keys::PAGE.to_string(), serde_json::json!(page));
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata
            .get(metadata_keys::SOURCE)
            .and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub chunk_index: usize,
    pub metadata: Metadata,
}

impl DocumentChunk {
    pub fn new(document_id: Uuid, content: impl Into<String>, chunk_index: usize) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(
            metadata_keys::CHUNK_INDEX.to_string(),
            serde_json::json!(chunk_index),
        );
        Self {
            id: Uuid::new_v4(),
            document_id,
            content: content.into(),
            chunk_index,
            metadata,
        }
    }

    /// Replaces the metadata, keeping the chunk ordinal entry in place.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self.metadata.insert(
            metadata_keys::CHUNK_INDEX.to_string(),
            serde_json::json!(self.chunk_index),
        );
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata
            .get(metadata_keys::SOURCE)
            .and_then(|v| v.as_str())
    }

    /// Length in characters, the unit every size limit in the pipeline uses.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Rough token count at four characters per token.
    pub fn estimated_tokens(&self) -> usize {
        self.char_len() / 4
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_keeps_ordinal_when_metadata_replaced() {
        let doc = Document::new("notes.txt", "hello").with_source("/data/notes.txt");
        let chunk = DocumentChunk::new(doc.id, "hello", 3).with_metadata(doc.metadata.clone());

        assert_eq!(chunk.source(), Some("/data/notes.txt"));
        assert_eq!(
            chunk.metadata.get(metadata_keys::CHUNK_INDEX),
            Some(&serde_json::json!(3))
        );
    }

    #[test]
    fn test_estimated_tokens_counts_characters() {
        let chunk = DocumentChunk::new(Uuid::new_v4(), "ééééééééé", 0);
        assert_eq!(chunk.char_len(), 9);
        assert_eq!(chunk.estimated_tokens(), 2);
    }
}
