//! Embedding vectors: binary serialization and cosine similarity.
//!
//! Generation itself is an external collaborator — see [`EmbeddingProvider`].
//! This module only owns the wire format (little-endian f32 bytes) and the
//! similarity math used throughout retrieval and relation auto-linking.

use thiserror::Error;

use crate::memory::EMBEDDING_DIMENSIONS;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("embedding has wrong dimension: expected {expected}, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("embedding byte buffer is not a multiple of 4 bytes (got {0})")]
    MalformedBytes(usize),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// An external source of dense embedding vectors.
///
/// Out of scope for this crate: the model/HTTP client behind it. Callers
/// supply an implementation (local model, hosted API, mock for tests).
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch form; the default falls back to one call per text.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Serializes an embedding as little-endian f32 bytes, the layout the
/// store persists in its `embedding BLOB` column.
pub fn to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserializes an embedding from little-endian f32 bytes.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(EmbeddingError::MalformedBytes(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Validates that a freshly-produced embedding has the expected width.
pub fn validate_dimensions(vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIMENSIONS {
        return Err(EmbeddingError::WrongDimension {
            expected: EMBEDDING_DIMENSIONS,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Cosine similarity, `dot / (||a|| * ||b||)`. An all-zero vector on
/// either side yields 0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip_is_float_equal() {
        let vector: Vec<f32> = (0..1536).map(|i| (i as f32) * 0.001 - 0.5).collect();
        let bytes = to_bytes(&vector);
        let back = from_bytes(&bytes).unwrap();
        assert_eq!(vector, back);
    }

    #[test]
    fn malformed_byte_length_is_rejected() {
        assert!(from_bytes(&[0, 1, 2]).is_err());
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.5_f32, 0.25, -0.75, 1.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn all_zero_vector_yields_zero_similarity() {
        let zero = vec![0.0_f32; 8];
        let other = vec![1.0_f32; 8];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn orthogonal_vectors_have_zero_similarity() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
