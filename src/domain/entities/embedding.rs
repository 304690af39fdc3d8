use serde::{Deserialize, Serialize};

/// Dimension of every vector this system produces and indexes.
pub const EMBEDDING_DIMENSION: usize = 384;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn new(vec: Vec<f32>) -> Self {
        Self(vec)
    }

    /// Builds a unit-length embedding. A zero vector is returned unchanged.
    pub fn normalized(vec: Vec<f32>) -> Self {
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Self(vec);
        }
        Self(vec.into_iter().map(|x| x / norm).collect())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }

        let dot_product: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a = self.norm();
        let norm_b = other.norm();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vec: Vec<f32>) -> Self {
        Self(vec)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_has_unit_length() {
        let emb = Embedding::normalized(vec![3.0, 4.0]);
        assert!((emb.norm() - 1.0).abs() < 1e-6);
        assert!((emb.as_slice()[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_zero_vector() {
        let emb = Embedding::normalized(vec![0.0; 4]);
        assert_eq!(emb.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }
}
