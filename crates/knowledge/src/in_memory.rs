//! In-process backend with exact k-NN search

use crate::backend::{Collection, QueryInput, QueryMatch, VectorBackend};
use crate::embeddings::EmbeddingFunction;
use async_trait::async_trait;
use rusty_vectors_common::{DistanceMethod, Metadata, Result, VectorStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBackendError {
    #[error("Collection {collection} expects embeddings of dimension {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Collection {0} has no embedding function; embeddings must be supplied")]
    MissingEmbeddingFunction(String),

    #[error("Embedding function returned {actual} vectors for {expected} inputs")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    #[error("Collection {0} cannot store empty embeddings")]
    EmptyEmbedding(String),
}

/// Backend keeping every collection in memory. Searches are brute force, so
/// results are exact.
#[derive(Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, Arc<InMemoryCollection>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn get_or_create_collection(
        &self,
        name: &str,
        distance: DistanceMethod,
        embedding_function: Option<Arc<dyn EmbeddingFunction>>,
    ) -> Result<Arc<dyn Collection>> {
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(name) {
            if existing.distance != distance {
                warn!(
                    "Collection {} already uses {} distance, ignoring requested {}",
                    name, existing.distance, distance
                );
            }
            return Ok(existing.clone());
        }

        info!("Creating in-memory collection: {} ({})", name, distance);
        let collection = Arc::new(InMemoryCollection {
            name: name.to_string(),
            distance,
            embedding_function,
            state: RwLock::new(CollectionState::default()),
        });
        collections.insert(name.to_string(), collection.clone());

        Ok(collection)
    }

    fn supports_embedding_functions(&self) -> bool {
        true
    }
}

pub struct InMemoryCollection {
    name: String,
    distance: DistanceMethod,
    embedding_function: Option<Arc<dyn EmbeddingFunction>>,
    state: RwLock<CollectionState>,
}

#[derive(Default)]
struct CollectionState {
    dimension: Option<usize>,
    rows: HashMap<String, StoredRow>,
}

struct StoredRow {
    embedding: Vec<f32>,
    document: String,
    metadata: Metadata,
}

impl InMemoryCollection {
    fn embed_with_function(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let function = self.embedding_function.as_ref().ok_or_else(|| {
            VectorStoreError::backend(InMemoryBackendError::MissingEmbeddingFunction(
                self.name.clone(),
            ))
        })?;

        let embeddings = function.embed(texts)?;
        if embeddings.len() != texts.len() {
            return Err(VectorStoreError::backend(
                InMemoryBackendError::EmbeddingCountMismatch {
                    expected: texts.len(),
                    actual: embeddings.len(),
                },
            ));
        }

        Ok(embeddings)
    }

    fn check_dimension(&self, expected: Option<usize>, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(VectorStoreError::backend(InMemoryBackendError::EmptyEmbedding(
                self.name.clone(),
            )));
        }
        match expected {
            Some(expected) if expected != embedding.len() => Err(VectorStoreError::backend(
                InMemoryBackendError::DimensionMismatch {
                    collection: self.name.clone(),
                    expected,
                    actual: embedding.len(),
                },
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn distance(&self) -> DistanceMethod {
        self.distance
    }

    async fn add(
        &self,
        ids: Vec<String>,
        embeddings: Option<Vec<Vec<f32>>>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<()> {
        if ids.len() != documents.len()
            || ids.len() != metadatas.len()
            || embeddings.as_ref().is_some_and(|e| e.len() != ids.len())
        {
            return Err(VectorStoreError::InvalidArgument(format!(
                "Column lengths differ: {} ids, {} documents, {} metadatas, {} embeddings",
                ids.len(),
                documents.len(),
                metadatas.len(),
                embeddings.as_ref().map_or(0, |e| e.len())
            )));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let embeddings = match embeddings {
            Some(embeddings) => embeddings,
            None => self.embed_with_function(&documents)?,
        };

        let mut state = self.state.write().await;

        // Validate the whole batch before touching any row.
        let mut dimension = state.dimension;
        for embedding in &embeddings {
            self.check_dimension(dimension, embedding)?;
            dimension = Some(embedding.len());
        }
        state.dimension = dimension;

        let count = ids.len();
        for (((id, embedding), document), metadata) in ids
            .into_iter()
            .zip(embeddings)
            .zip(documents)
            .zip(metadatas)
        {
            state.rows.insert(
                id,
                StoredRow {
                    embedding,
                    document,
                    metadata,
                },
            );
        }

        debug!(
            "Added {} rows to collection {} ({} total)",
            count,
            self.name,
            state.rows.len()
        );
        Ok(())
    }

    async fn query(&self, input: QueryInput, n_results: usize) -> Result<Vec<Vec<QueryMatch>>> {
        if n_results == 0 {
            return Err(VectorStoreError::InvalidArgument(
                "n_results must be greater than zero".to_string(),
            ));
        }

        let queries = match input {
            QueryInput::Embeddings(embeddings) => embeddings,
            QueryInput::Texts(texts) => self.embed_with_function(&texts)?,
        };

        let state = self.state.read().await;
        let mut results = Vec::with_capacity(queries.len());

        for query in &queries {
            if state.rows.is_empty() {
                results.push(Vec::new());
                continue;
            }
            self.check_dimension(state.dimension, query)?;

            let mut scored: Vec<(f32, &String, &StoredRow)> = state
                .rows
                .iter()
                .map(|(id, row)| (self.distance.distance(query, &row.embedding), id, row))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            scored.truncate(n_results);

            results.push(
                scored
                    .into_iter()
                    .map(|(distance, id, row)| QueryMatch {
                        id: id.clone(),
                        document: row.document.clone(),
                        metadata: row.metadata.clone(),
                        distance,
                    })
                    .collect(),
            );
        }

        debug!(
            "Collection {} answered {} queries (n_results={})",
            self.name,
            results.len(),
            n_results
        );
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbeddings;

    fn meta(key: &str) -> Metadata {
        Metadata::from([("key".to_string(), serde_json::json!(key))])
    }

    async fn seeded(distance: DistanceMethod) -> Arc<dyn Collection> {
        let backend = InMemoryBackend::new();
        let collection = backend
            .get_or_create_collection("test", distance, None)
            .await
            .unwrap();
        collection
            .add(
                vec!["a".into(), "b".into(), "c".into()],
                Some(vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![3.0, 4.0]]),
                vec!["origin".into(), "unit".into(), "far".into()],
                vec![meta("a"), meta("b"), meta("c")],
            )
            .await
            .unwrap();
        collection
    }

    #[tokio::test]
    async fn test_query_orders_nearest_first() {
        let collection = seeded(DistanceMethod::L2).await;

        let results = collection
            .query(QueryInput::Embeddings(vec![vec![0.9, 0.0]]), 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let ids: Vec<&str> = results[0].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!((results[0][0].distance - 0.01).abs() < 1e-5);
        assert_eq!(results[0][0].document, "unit");
        assert_eq!(results[0][0].metadata, meta("b"));
    }

    #[tokio::test]
    async fn test_query_on_sparse_collection_returns_what_exists() {
        let collection = seeded(DistanceMethod::L2).await;

        let results = collection
            .query(QueryInput::Embeddings(vec![vec![0.0, 0.0]]), 10)
            .await
            .unwrap();
        assert_eq!(results[0].len(), 3);
    }

    #[tokio::test]
    async fn test_query_empty_collection() {
        let backend = InMemoryBackend::new();
        let collection = backend
            .get_or_create_collection("empty", DistanceMethod::Cosine, None)
            .await
            .unwrap();

        let results = collection
            .query(QueryInput::Embeddings(vec![vec![1.0, 2.0]]), 1)
            .await
            .unwrap();
        assert_eq!(results, vec![Vec::new()]);
    }

    #[tokio::test]
    async fn test_add_overwrites_existing_id() {
        let collection = seeded(DistanceMethod::L2).await;

        collection
            .add(
                vec!["a".into()],
                Some(vec![vec![0.0, 0.0]]),
                vec!["origin".into()],
                vec![meta("updated")],
            )
            .await
            .unwrap();

        assert_eq!(collection.count().await.unwrap(), 3);
        let results = collection
            .query(QueryInput::Embeddings(vec![vec![0.0, 0.0]]), 1)
            .await
            .unwrap();
        assert_eq!(results[0][0].metadata, meta("updated"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let collection = seeded(DistanceMethod::L2).await;

        let err = collection
            .add(
                vec!["d".into()],
                Some(vec![vec![1.0, 2.0, 3.0]]),
                vec!["three".into()],
                vec![meta("d")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Backend(_)));
        assert!(err.to_string().contains("dimension 2, got 3"));

        let err = collection
            .query(QueryInput::Embeddings(vec![vec![1.0]]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Backend(_)));
        assert_eq!(collection.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mismatched_columns_are_rejected() {
        let collection = seeded(DistanceMethod::L2).await;

        let err = collection
            .add(vec!["x".into()], None, vec![], vec![meta("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_text_paths_need_an_embedding_function() {
        let collection = seeded(DistanceMethod::L2).await;

        let err = collection
            .query(QueryInput::Texts(vec!["origin".into()]), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has no embedding function"));

        let err = collection
            .add(vec!["x".into()], None, vec!["x".into()], vec![meta("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_embedding_function_handles_documents_and_queries() {
        let backend = InMemoryBackend::new();
        let function: Arc<dyn EmbeddingFunction> = Arc::new(HashingEmbeddings::new(64).unwrap());
        let collection = backend
            .get_or_create_collection("native", DistanceMethod::Cosine, Some(function))
            .await
            .unwrap();

        collection
            .add(
                vec!["1".into(), "2".into()],
                None,
                vec!["red apple pie".into(), "blue ocean waves".into()],
                vec![meta("1"), meta("2")],
            )
            .await
            .unwrap();

        let results = collection
            .query(QueryInput::Texts(vec!["blue ocean waves".into()]), 1)
            .await
            .unwrap();
        assert_eq!(results[0][0].id, "2");
        assert!(results[0][0].distance.abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_existing_collection_keeps_its_distance() {
        let backend = InMemoryBackend::new();
        backend
            .get_or_create_collection("docs", DistanceMethod::Cosine, None)
            .await
            .unwrap();

        let again = backend
            .get_or_create_collection("docs", DistanceMethod::Ip, None)
            .await
            .unwrap();
        assert_eq!(again.distance(), DistanceMethod::Cosine);
        assert_eq!(backend.collection_names().await, vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_results_requested_is_invalid() {
        let collection = seeded(DistanceMethod::Ip).await;
        let err = collection
            .query(QueryInput::Embeddings(vec![vec![1.0, 0.0]]), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));
    }
}
