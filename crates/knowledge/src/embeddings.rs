//! Embedding capabilities consumed by the vector store

use async_trait::async_trait;
use rusty_vectors_common::{Result, VectorStoreError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Turns text into vectors on the caller's side of the backend.
///
/// Implementations must return exactly one vector per input text, in input
/// order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embedding function handed to the backend, which then embeds documents
/// and text queries itself.
pub trait EmbeddingFunction: Send + Sync {
    fn name(&self) -> &str;

    fn embed(&self, documents: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Where embedding happens for a store.
#[derive(Clone)]
pub enum EmbeddingProvider {
    /// Texts are embedded locally before they reach the backend.
    Internal(Arc<dyn Embeddings>),
    /// Raw texts go to the backend, which embeds them with this function.
    BackendNative(Arc<dyn EmbeddingFunction>),
}

impl EmbeddingProvider {
    pub fn internal(embeddings: impl Embeddings + 'static) -> Self {
        EmbeddingProvider::Internal(Arc::new(embeddings))
    }

    pub fn backend_native(function: impl EmbeddingFunction + 'static) -> Self {
        EmbeddingProvider::BackendNative(Arc::new(function))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, EmbeddingProvider::Internal(_))
    }
}

impl fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingProvider::Internal(_) => f.write_str("Internal"),
            EmbeddingProvider::BackendNative(function) => {
                f.debug_tuple("BackendNative").field(&function.name()).finish()
            }
        }
    }
}

/// Deterministic hashed bag-of-words embedding.
///
/// Each lowercased whitespace token is hashed into one of `dimension`
/// buckets and the resulting counts are L2 normalised. Works offline and is
/// stable across runs, which makes it useful for local setups and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbeddings {
    dimension: usize,
}

impl HashingEmbeddings {
    pub const DEFAULT_DIMENSION: usize = 128;

    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::Configuration(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for word in text.to_lowercase().split_whitespace() {
            let digest = Sha256::digest(word.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            embedding[idx] += 1.0;
        }

        let magnitude = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in embedding.iter_mut() {
                *val /= magnitude;
            }
        }

        embedding
    }
}

impl Default for HashingEmbeddings {
    fn default() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl Embeddings for HashingEmbeddings {
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

impl EmbeddingFunction for HashingEmbeddings {
    fn name(&self) -> &str {
        "hashing"
    }

    fn embed(&self, documents: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(documents.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embeddings_are_normalised_and_stable() {
        let embeddings = HashingEmbeddings::new(32).unwrap();
        let texts = vec!["Hello world".to_string(), "hello WORLD".to_string()];

        let vectors = embeddings.embed_text(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 32);
        assert_eq!(vectors[0], vectors[1]);

        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_embeds_to_zero_vector() {
        let embeddings = HashingEmbeddings::default();
        let vector = embeddings.embed_one("   ");
        assert_eq!(vector.len(), HashingEmbeddings::DEFAULT_DIMENSION);
        assert!(vector.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        assert!(matches!(
            HashingEmbeddings::new(0),
            Err(VectorStoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_provider_debug() {
        let native = EmbeddingProvider::backend_native(HashingEmbeddings::default());
        assert_eq!(format!("{:?}", native), "BackendNative(\"hashing\")");
        assert!(!native.is_internal());
        assert!(EmbeddingProvider::internal(HashingEmbeddings::default()).is_internal());
    }
}
