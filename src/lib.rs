//! Embedding-backed vector store, wired from settings.

pub mod settings;
pub mod telemetry;

pub use rusty_vectors_common::{
    content_id, DistanceMethod, Metadata, Result, VectorEntry, VectorStoreError,
};
pub use rusty_vectors_knowledge::{
    CollectionStore, EmbeddingProvider, HashingEmbeddings, InMemoryBackend, StoreConfig,
    VectorBackend, VectorStore, DEFAULT_RETRIEVE_LIMIT,
};

use settings::{BackendSettings, EmbeddingSettings, Settings};
use std::sync::Arc;
use tracing::info;

/// Builds the backend selected in settings. Backends compiled out of this
/// build are a configuration error.
pub fn build_backend(settings: &BackendSettings) -> Result<Arc<dyn VectorBackend>> {
    match settings {
        BackendSettings::InMemory => Ok(Arc::new(InMemoryBackend::new())),
        #[cfg(feature = "qdrant")]
        BackendSettings::Qdrant { url, vector_size } => Ok(Arc::new(
            rusty_vectors_knowledge::QdrantBackend::new(url, *vector_size)?,
        )),
        #[cfg(not(feature = "qdrant"))]
        BackendSettings::Qdrant { .. } => Err(VectorStoreError::Configuration(
            "Qdrant backend requested but this build lacks the `qdrant` feature".to_string(),
        )),
    }
}

pub fn build_embedding_provider(settings: &EmbeddingSettings) -> Result<EmbeddingProvider> {
    match settings {
        EmbeddingSettings::Hashing { dimension } => Ok(EmbeddingProvider::internal(
            HashingEmbeddings::new(*dimension)?,
        )),
        EmbeddingSettings::BackendNative { dimension } => Ok(EmbeddingProvider::backend_native(
            HashingEmbeddings::new(*dimension)?,
        )),
        #[cfg(feature = "openai")]
        EmbeddingSettings::OpenAi { model, api_key } => Ok(EmbeddingProvider::internal(
            rusty_vectors_knowledge::OpenAiEmbeddings::new(api_key.clone(), model.as_str()),
        )),
        #[cfg(not(feature = "openai"))]
        EmbeddingSettings::OpenAi { .. } => Err(VectorStoreError::Configuration(
            "OpenAI embeddings requested but this build lacks the `openai` feature".to_string(),
        )),
    }
}

/// Creates a store from settings. Fails fast on any configuration problem;
/// the backend collection itself is only created on first use.
pub fn build_store(settings: &Settings) -> Result<CollectionStore> {
    let backend = build_backend(&settings.backend)?;
    let embedding_provider = build_embedding_provider(&settings.embedding)?;

    let config = StoreConfig {
        index_name: settings.store.index_name.clone(),
        embedding_provider,
        max_distance: settings.store.max_distance,
        distance_method: settings.store.distance_method,
    };

    let store = CollectionStore::new(backend, config)?;
    info!("Built {}", store);
    Ok(store)
}
