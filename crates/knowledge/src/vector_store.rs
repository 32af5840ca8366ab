use crate::backend::{Collection, QueryInput, QueryMatch, VectorBackend};
use crate::embeddings::{EmbeddingProvider, Embeddings};
use async_trait::async_trait;
use rusty_vectors_common::{
    content_id, DistanceMethod, Metadata, Result, VectorEntry, VectorStoreError,
};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_RETRIEVE_LIMIT: usize = 5;

/// Store and similarity-retrieval contract shared by every vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists entries under ids derived from their content.
    async fn store(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Returns up to `k` entries nearest to `vector`, nearest first.
    async fn retrieve(&self, vector: &[f32], k: usize) -> Result<Vec<VectorEntry>>;

    /// Returns the single stored text nearest to `text`, or `None` when the
    /// store is empty or the best match is too far away.
    async fn find_similar(&self, text: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub index_name: String,
    pub embedding_provider: EmbeddingProvider,
    pub max_distance: Option<f32>,
    pub distance_method: DistanceMethod,
}

impl StoreConfig {
    pub fn new(index_name: impl Into<String>, embedding_provider: EmbeddingProvider) -> Self {
        Self {
            index_name: index_name.into(),
            embedding_provider,
            max_distance: None,
            distance_method: DistanceMethod::default(),
        }
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_distance_method(mut self, distance_method: DistanceMethod) -> Self {
        self.distance_method = distance_method;
        self
    }
}

/// Layout of the metadata written next to every stored document.
#[derive(Debug, Deserialize)]
struct StoredMetadata {
    key: String,
    #[serde(default)]
    metadata: Metadata,
}

impl StoredMetadata {
    fn into_row(self) -> Result<Metadata> {
        Ok(Metadata::from([
            ("key".to_string(), serde_json::Value::String(self.key)),
            ("metadata".to_string(), serde_json::to_value(self.metadata)?),
        ]))
    }

    fn from_row(row: Metadata) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            row.into_iter().collect(),
        ))?)
    }
}

/// `VectorStore` over a collection of an ANN backend.
///
/// Embedding happens either here, through an [`Embeddings`] provider, or
/// inside the backend through an embedding function, depending on the
/// configured [`EmbeddingProvider`]. The collection is created on first use.
pub struct CollectionStore {
    backend: Arc<dyn VectorBackend>,
    config: StoreConfig,
}

impl CollectionStore {
    pub fn new(backend: Arc<dyn VectorBackend>, config: StoreConfig) -> Result<Self> {
        if config.index_name.trim().is_empty() {
            return Err(VectorStoreError::Configuration(
                "Index name must not be empty".to_string(),
            ));
        }
        if let Some(max_distance) = config.max_distance {
            if max_distance.is_nan() || max_distance < 0.0 {
                return Err(VectorStoreError::Configuration(format!(
                    "Invalid max distance: {}",
                    max_distance
                )));
            }
        }
        if let EmbeddingProvider::BackendNative(function) = &config.embedding_provider {
            if !backend.supports_embedding_functions() {
                return Err(VectorStoreError::Configuration(format!(
                    "Backend cannot run embedding function '{}'; configure an internal embedding provider",
                    function.name()
                )));
            }
        }

        info!(
            "Vector store ready: index={} distance={} max_distance={:?} embedding={:?}",
            config.index_name, config.distance_method, config.max_distance, config.embedding_provider
        );
        Ok(Self { backend, config })
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    pub fn distance_method(&self) -> DistanceMethod {
        self.config.distance_method
    }

    pub fn max_distance(&self) -> Option<f32> {
        self.config.max_distance
    }

    /// Number of rows currently in the collection.
    pub async fn count(&self) -> Result<usize> {
        self.collection().await?.count().await
    }

    async fn collection(&self) -> Result<Arc<dyn Collection>> {
        let embedding_function = match &self.config.embedding_provider {
            EmbeddingProvider::Internal(_) => None,
            EmbeddingProvider::BackendNative(function) => Some(function.clone()),
        };

        self.backend
            .get_or_create_collection(
                &self.config.index_name,
                self.config.distance_method,
                embedding_function,
            )
            .await
    }

    fn accept(&self, best: Option<QueryMatch>) -> Option<String> {
        let best = best?;
        match self.config.max_distance {
            // NaN never satisfies the threshold
            Some(max_distance) if best.distance.is_nan() || best.distance > max_distance => {
                debug!(
                    "Best match at distance {} exceeds max distance {}",
                    best.distance, max_distance
                );
                None
            }
            _ => Some(best.document),
        }
    }
}

async fn embed_checked(embeddings: &Arc<dyn Embeddings>, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let vectors = embeddings.embed_text(texts).await?;
    if vectors.len() != texts.len() {
        return Err(VectorStoreError::embedding(format!(
            "Embedding provider returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

#[async_trait]
impl VectorStore for CollectionStore {
    #[instrument(skip(self, entries), fields(index = %self.config.index_name, count = entries.len()))]
    async fn store(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let collection = self.collection().await?;
        if entries.is_empty() {
            debug!("Nothing to store");
            return Ok(());
        }

        let mut ids = Vec::with_capacity(entries.len());
        let mut documents = Vec::with_capacity(entries.len());
        let mut metadatas = Vec::with_capacity(entries.len());

        for entry in entries {
            ids.push(content_id(&entry.vector));
            metadatas.push(
                StoredMetadata {
                    key: entry.key,
                    metadata: entry.metadata,
                }
                .into_row()?,
            );
            documents.push(entry.vector);
        }

        let embeddings = match &self.config.embedding_provider {
            EmbeddingProvider::Internal(embeddings) => {
                Some(embed_checked(embeddings, &documents).await?)
            }
            EmbeddingProvider::BackendNative(_) => None,
        };

        let count = ids.len();
        collection.add(ids, embeddings, documents, metadatas).await?;

        info!("Stored {} entries in {}", count, self.config.index_name);
        Ok(())
    }

    #[instrument(skip(self, vector), fields(index = %self.config.index_name))]
    async fn retrieve(&self, vector: &[f32], k: usize) -> Result<Vec<VectorEntry>> {
        if k == 0 {
            return Err(VectorStoreError::InvalidArgument(
                "k must be greater than zero".to_string(),
            ));
        }

        let collection = self.collection().await?;
        let rows = collection
            .query(QueryInput::Embeddings(vec![vector.to_vec()]), k)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let entries = rows
            .into_iter()
            .map(|row| {
                let stored = StoredMetadata::from_row(row.metadata)?;
                Ok(VectorEntry {
                    key: stored.key,
                    vector: row.document,
                    metadata: stored.metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Retrieved {} entries", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self, text), fields(index = %self.config.index_name))]
    async fn find_similar(&self, text: &str) -> Result<Option<String>> {
        let collection = self.collection().await?;

        let input = match &self.config.embedding_provider {
            EmbeddingProvider::Internal(embeddings) => {
                QueryInput::Embeddings(embed_checked(embeddings, &[text.to_string()]).await?)
            }
            EmbeddingProvider::BackendNative(_) => QueryInput::Texts(vec![text.to_string()]),
        };

        let best = collection
            .query(input, 1)
            .await?
            .into_iter()
            .next()
            .and_then(|rows| rows.into_iter().next());

        Ok(self.accept(best))
    }
}

impl fmt::Display for CollectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionStore(index_name={})", self.config.index_name)
    }
}

impl fmt::Debug for CollectionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
