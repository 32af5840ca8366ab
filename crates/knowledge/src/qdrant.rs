//! Qdrant backend adapter

use crate::backend::{Collection, QueryInput, QueryMatch, VectorBackend};
use crate::embeddings::EmbeddingFunction;
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        vectors_config::Config, CollectionInfo, CountPointsBuilder, CreateCollectionBuilder,
        Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    },
    Payload, Qdrant,
};
use rusty_vectors_common::{DistanceMethod, Metadata, Result, VectorStoreError};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct QdrantBackend {
    client: Arc<Qdrant>,
    vector_size: u64,
}

impl QdrantBackend {
    /// `vector_size` is used when a collection has to be created and must
    /// match the embedding provider's output.
    pub fn new(url: &str, vector_size: u64) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| {
                VectorStoreError::Configuration(format!("Failed to create Qdrant client: {}", e))
            })?;

        Ok(Self {
            client: Arc::new(client),
            vector_size,
        })
    }
}

fn qdrant_distance(distance: DistanceMethod) -> Distance {
    match distance {
        DistanceMethod::L2 => Distance::Euclid,
        DistanceMethod::Ip => Distance::Dot,
        DistanceMethod::Cosine => Distance::Cosine,
    }
}

fn distance_method(distance: Distance) -> Option<DistanceMethod> {
    match distance {
        Distance::Euclid => Some(DistanceMethod::L2),
        Distance::Dot => Some(DistanceMethod::Ip),
        Distance::Cosine => Some(DistanceMethod::Cosine),
        _ => None,
    }
}

/// Metric of a collection with a single unnamed vector. Named vector maps
/// and metrics without a store counterpart give `None`.
fn configured_distance(info: &CollectionInfo) -> Option<DistanceMethod> {
    let vectors_config = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors_config.config.as_ref()? {
        Config::Params(params) => Distance::try_from(params.distance)
            .ok()
            .and_then(distance_method),
        Config::ParamsMap(_) => None,
    }
}

/// Qdrant reports euclidean distance for `Euclid` and similarity for the
/// other metrics; map both onto the store's smaller-is-nearer distances.
fn score_to_distance(distance: DistanceMethod, score: f32) -> f32 {
    match distance {
        DistanceMethod::L2 => score * score,
        DistanceMethod::Ip | DistanceMethod::Cosine => 1.0 - score,
    }
}

/// Qdrant point ids must be UUIDs or integers.
fn point_id(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn get_or_create_collection(
        &self,
        name: &str,
        distance: DistanceMethod,
        _embedding_function: Option<Arc<dyn EmbeddingFunction>>,
    ) -> Result<Arc<dyn Collection>> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(VectorStoreError::backend)?;
        let exists = collections.collections.iter().any(|c| c.name == name);

        let distance = if exists {
            let response = self
                .client
                .collection_info(name)
                .await
                .map_err(VectorStoreError::backend)?;

            match response.result.as_ref().and_then(configured_distance) {
                Some(existing) if existing != distance => {
                    warn!(
                        "Collection {} already uses distance {}, ignoring requested {}",
                        name, existing, distance
                    );
                    existing
                }
                Some(existing) => existing,
                None => {
                    warn!(
                        "Could not read the distance of collection {}, assuming {}",
                        name, distance
                    );
                    distance
                }
            }
        } else {
            info!("Creating Qdrant collection: {} ({})", name, distance);

            let create_collection = CreateCollectionBuilder::new(name).vectors_config(
                VectorParamsBuilder::new(self.vector_size, qdrant_distance(distance)),
            );
            self.client
                .create_collection(create_collection)
                .await
                .map_err(VectorStoreError::backend)?;
            distance
        };

        Ok(Arc::new(QdrantCollection {
            client: self.client.clone(),
            name: name.to_string(),
            distance,
        }))
    }
}

pub struct QdrantCollection {
    client: Arc<Qdrant>,
    name: String,
    distance: DistanceMethod,
}

#[async_trait]
impl Collection for QdrantCollection {
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
        let embeddings = embeddings.ok_or_else(|| {
            VectorStoreError::InvalidArgument(
                "Qdrant collections require precomputed embeddings".to_string(),
            )
        })?;
        if ids.len() != embeddings.len() || ids.len() != documents.len() || ids.len() != metadatas.len()
        {
            return Err(VectorStoreError::InvalidArgument(format!(
                "Column lengths differ: {} ids, {} documents, {} metadatas, {} embeddings",
                ids.len(),
                documents.len(),
                metadatas.len(),
                embeddings.len()
            )));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut points = Vec::with_capacity(ids.len());
        for (((id, embedding), document), metadata) in ids
            .into_iter()
            .zip(embeddings)
            .zip(documents)
            .zip(metadatas)
        {
            let payload: Payload = serde_json::json!({
                "id": id,
                "document": document,
                "metadata": serde_json::to_string(&metadata)?,
            })
            .try_into()
            .map_err(VectorStoreError::backend)?;

            points.push(PointStruct::new(point_id(&id), embedding, payload));
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.name, points).wait(true))
            .await
            .map_err(VectorStoreError::backend)?;

        debug!("Upserted {} points into {}", count, self.name);
        Ok(())
    }

    async fn query(&self, input: QueryInput, n_results: usize) -> Result<Vec<Vec<QueryMatch>>> {
        let queries = match input {
            QueryInput::Embeddings(embeddings) => embeddings,
            QueryInput::Texts(_) => {
                return Err(VectorStoreError::InvalidArgument(
                    "Qdrant collections cannot be queried by text".to_string(),
                ))
            }
        };

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let search_points = SearchPointsBuilder::new(&self.name, query, n_results as u64)
                .with_payload(true);
            let response = self
                .client
                .search_points(search_points)
                .await
                .map_err(VectorStoreError::backend)?;

            let mut matches = Vec::with_capacity(response.result.len());
            for point in response.result {
                let payload = point.payload;
                let text = |field: &str| {
                    payload
                        .get(field)
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                        .unwrap_or_default()
                };

                let metadata: Metadata = match payload.get("metadata").and_then(|v| v.as_str()) {
                    Some(raw) => serde_json::from_str(raw)?,
                    None => Metadata::new(),
                };

                matches.push(QueryMatch {
                    id: text("id"),
                    document: text("document"),
                    metadata,
                    distance: score_to_distance(self.distance, point.score),
                });
            }
            results.push(matches);
        }

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.name).exact(true))
            .await
            .map_err(VectorStoreError::backend)?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
