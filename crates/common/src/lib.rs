use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Caller-defined metadata attached to an entry. Opaque to the store.
pub type Metadata = HashMap<String, serde_json::Value>;

// Stored unit for the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Caller supplied reference, e.g. the source document.
    pub key: String,
    /// The embedded content in text form.
    pub vector: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorEntry {
    pub fn new(key: impl Into<String>, vector: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            vector: vector.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Storage identifier derived from the entry payload.
    pub fn content_id(&self) -> String {
        content_id(&self.vector)
    }
}

/// Hex encoded SHA-256 of the UTF-8 payload. Identical content always maps
/// to the same id, so re-storing it overwrites instead of duplicating.
pub fn content_id(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

// Distance metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMethod {
    /// Squared euclidean distance.
    #[default]
    L2,
    /// Inner product, reported as `1 - a·b`.
    Ip,
    /// Cosine, reported as `1 - cos(a, b)`.
    Cosine,
}

impl DistanceMethod {
    /// Distance between two vectors of equal length. Smaller is nearer.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMethod::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            DistanceMethod::Ip => 1.0 - dot(a, b),
            DistanceMethod::Cosine => {
                let norm_a = dot(a, a).sqrt();
                let norm_b = dot(b, b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot(a, b) / (norm_a * norm_b)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMethod::L2 => "l2",
            DistanceMethod::Ip => "ip",
            DistanceMethod::Cosine => "cosine",
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMethod {
    type Err = VectorStoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l2" => Ok(DistanceMethod::L2),
            "ip" => Ok(DistanceMethod::Ip),
            "cosine" => Ok(DistanceMethod::Cosine),
            _ => Err(VectorStoreError::Configuration(format!(
                "Invalid distance method: {} (expected l2, ip or cosine)",
                s
            ))),
        }
    }
}

// Error types
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Backend(BoxError),

    #[error(transparent)]
    Embedding(BoxError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VectorStoreError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        VectorStoreError::Backend(err.into())
    }

    pub fn embedding(err: impl Into<BoxError>) -> Self {
        VectorStoreError::Embedding(err.into())
    }
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
