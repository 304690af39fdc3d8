mod conversation;
mod document;
mod embedding;

pub use conversation::{Conversation, ConversationState, Message, MessageRole};
pub use document::{metadata_keys, Document, DocumentChunk, Metadata, SearchResult};
pub use embedding::{Embedding, EMBEDDING_DIMENSION};
