//! OpenAI embeddings provider

use crate::embeddings::Embeddings;
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use rusty_vectors_common::{Result, VectorStoreError};
use tracing::debug;

pub struct OpenAiEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddings {
    /// Without an explicit key the client falls back to `OPENAI_API_KEY`.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        let config = match api_key {
            Some(key) => OpenAIConfig::new().with_api_key(key),
            None => OpenAIConfig::new(),
        };

        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embeddings for OpenAiEmbeddings {
    async fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.as_str())
            .input(texts.to_vec())
            .build()
            .map_err(VectorStoreError::embedding)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(VectorStoreError::embedding)?;

        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);

        debug!("Embedded {} texts with {}", data.len(), self.model);
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}
