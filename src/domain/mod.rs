pub mod entities;
pub mod errors;
pub mod ports;
pub mod preprocessing;

pub use entities::*;
pub use errors::{DomainError, Result};
pub use preprocessing::{chunk_documents, clean_text, ChunkingOptions, RecursiveSplitter};
