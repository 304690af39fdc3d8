use async_trait::async_trait;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding, EMBEDDING_DIMENSION};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic feature-hashing embedder for offline runs and tests.
///
/// Each lowercase word is hashed into one signed bucket; the bag is then
/// scaled to unit length. Texts sharing words score a positive cosine.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIMENSION,
        }
    }

    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        Embedding::normalized(vector)
    }
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding, DomainError> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_query_is_deterministic() {
        let embedder = HashingEmbedding::new();
        let a = embedder.embed_query("Where is the invoice?").await.unwrap();
        let b = embedder.embed_query("Where is the invoice?").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimension(), EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    async fn test_vectors_are_unit_length() {
        let embedder = HashingEmbedding::new();
        let vectors = embedder
            .embed(&["alpha beta", "gamma delta epsilon"])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        for v in vectors {
            assert!((v.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashingEmbedding::new();
        let query = embedder.embed_text("solar panel efficiency");
        let related = embedder.embed_text("The solar panel efficiency reached 22 percent.");
        let unrelated = embedder.embed_text("Quarterly tax filing deadlines moved.");
        assert!(query.cosine_similarity(&related) > query.cosine_similarity(&unrelated));
    }
}
