//! Capabilities the store consumes from an ANN backend

use crate::embeddings::EmbeddingFunction;
use async_trait::async_trait;
use rusty_vectors_common::{DistanceMethod, Metadata, Result};
use std::sync::Arc;

/// A backend that hosts named collections of vectors.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Returns the named collection, creating it with `distance` when it does
    /// not exist yet. The distance method of an existing collection is never
    /// changed.
    async fn get_or_create_collection(
        &self,
        name: &str,
        distance: DistanceMethod,
        embedding_function: Option<Arc<dyn EmbeddingFunction>>,
    ) -> Result<Arc<dyn Collection>>;

    /// Whether collections can embed documents and text queries themselves.
    fn supports_embedding_functions(&self) -> bool {
        false
    }
}

/// A single collection inside a backend.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    fn distance(&self) -> DistanceMethod;

    /// Writes rows column-wise. `embeddings` may be omitted when the
    /// collection embeds documents itself. Rows with an existing id are
    /// overwritten.
    async fn add(
        &self,
        ids: Vec<String>,
        embeddings: Option<Vec<Vec<f32>>>,
        documents: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<()>;

    /// Runs one k-NN query per input. Each inner list is ordered nearest
    /// first and holds at most `n_results` matches.
    async fn query(&self, input: QueryInput, n_results: usize) -> Result<Vec<Vec<QueryMatch>>>;

    async fn count(&self) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Embeddings(Vec<Vec<f32>>),
    Texts(Vec<String>),
}

/// One row returned by a k-NN query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f32,
}
