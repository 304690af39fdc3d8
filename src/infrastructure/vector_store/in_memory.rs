use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};

struct Index {
    dimension: usize,
    points: Vec<(DocumentChunk, Embedding)>,
}

#[derive(Default)]
struct State {
    indexes: HashMap<String, Index>,
    /// Deleted indexes that still report as existing, with the number of
    /// existence checks left before they disappear.
    draining: HashMap<String, u32>,
    creations: usize,
}

/// Process-local vector store with brute-force cosine search.
///
/// `with_deletion_lag` mimics hosted backends where a deleted index keeps
/// showing up for a while and cannot be recreated until it is gone.
pub struct InMemoryVectorStore {
    state: RwLock<State>,
    deletion_lag: u32,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            deletion_lag: 0,
        }
    }

    pub fn with_deletion_lag(mut self, checks: u32) -> Self {
        self.deletion_lag = checks;
        self
    }

    /// Number of successful `create_index` calls so far.
    pub fn creation_count(&self) -> usize {
        self.state.read().map(|s| s.creations).unwrap_or_default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, DomainError> {
        self.state
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, DomainError> {
        self.state
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(index: &str) -> DomainError {
    DomainError::not_found(format!("index '{index}' does not exist"))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        if state.indexes.contains_key(index) {
            return Ok(true);
        }
        match state.draining.get(index).copied() {
            Some(remaining) if remaining > 0 => {
                state.draining.insert(index.to_string(), remaining - 1);
                Ok(true)
            }
            Some(_) => {
                state.draining.remove(index);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn create_index(&self, index: &str, dimension: usize) -> Result<(), DomainError> {
        let mut state = self.write()?;
        if state.indexes.contains_key(index) {
            return Err(DomainError::conflict(format!("index '{index}' already exists")));
        }
        if state.draining.get(index).is_some_and(|n| *n > 0) {
            return Err(DomainError::conflict(format!(
                "index '{index}' is still being deleted"
            )));
        }
        state.draining.remove(index);
        state.indexes.insert(
            index.to_string(),
            Index {
                dimension,
                points: Vec::new(),
            },
        );
        state.creations += 1;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), DomainError> {
        let mut state = self.write()?;
        if state.indexes.remove(index).is_none() {
            return Err(missing(index));
        }
        if self.deletion_lag > 0 {
            state.draining.insert(index.to_string(), self.deletion_lag);
        }
        Ok(())
    }

    async fn upsert(
        &self,
        index: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        let mut guard = self.write()?;
        let target = guard.indexes.get_mut(index).ok_or_else(|| missing(index))?;

        if let Some((_, bad)) = points
            .iter()
            .find(|(_, e)| e.dimension() != target.dimension)
        {
            return Err(DomainError::validation(format!(
                "vector dimension {} does not match index dimension {}",
                bad.dimension(),
                target.dimension
            )));
        }

        for (chunk, embedding) in points {
            target.points.retain(|(c, _)| c.id != chunk.id);
            target.points.push((chunk.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let state = self.read()?;
        let target = state.indexes.get(index).ok_or_else(|| missing(index))?;

        let mut results: Vec<SearchResult> = target
            .points
            .iter()
            .map(|(chunk, embedding)| SearchResult {
                chunk: chunk.clone(),
                score: query.cosine_similarity(embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        Ok(results)
    }

    async fn count(&self, index: &str) -> Result<u64, DomainError> {
        let state = self.read()?;
        let target = state.indexes.get(index).ok_or_else(|| missing(index))?;
        Ok(target.points.len() as u64)
    }
}
