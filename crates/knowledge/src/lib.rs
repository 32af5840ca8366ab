//! Vector store over pluggable ANN backends and embedding providers

pub mod backend;
pub mod embeddings;
pub mod in_memory;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod vector_store;

pub use backend::{Collection, QueryInput, QueryMatch, VectorBackend};
pub use embeddings::{EmbeddingFunction, EmbeddingProvider, Embeddings, HashingEmbeddings};
pub use in_memory::InMemoryBackend;
#[cfg(feature = "openai")]
pub use openai::OpenAiEmbeddings;
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantBackend;
pub use vector_store::{CollectionStore, StoreConfig, VectorStore, DEFAULT_RETRIEVE_LIMIT};
