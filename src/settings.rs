use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use rusty_vectors_common::DistanceMethod;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_SETTINGS_FILE: &str = "vector_store";
pub const ENV_PREFIX: &str = "VECTOR_STORE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default)]
    pub max_distance: Option<f32>,
    #[serde(default)]
    pub distance_method: DistanceMethod,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendSettings {
    #[default]
    InMemory,
    Qdrant {
        #[serde(default = "default_qdrant_url")]
        url: String,
        vector_size: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingSettings {
    /// Local hashed bag-of-words embeddings.
    Hashing {
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    /// Hashed embeddings computed inside the backend.
    BackendNative {
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    OpenAi {
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_index_name() -> String {
    "documents".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_dimension() -> usize {
    128
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_log_filter() -> String {
    "rusty_vectors=info,rusty_vectors_knowledge=info".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            max_distance: None,
            distance_method: DistanceMethod::default(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        EmbeddingSettings::Hashing {
            dimension: default_dimension(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or an optional `vector_store.*` file in the
    /// working directory), then applies `VECTOR_STORE__SECTION__KEY`
    /// environment overrides. A `.env` file is honoured when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let builder = match path {
            Some(path) => Config::builder().add_source(File::from(path)),
            None => Config::builder()
                .add_source(File::with_name(DEFAULT_SETTINGS_FILE).required(false)),
        };

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build settings")?;

        config
            .try_deserialize()
            .context("Failed to deserialize settings")
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .context("Failed to parse settings")?
            .try_deserialize()
            .context("Failed to deserialize settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.store.index_name, "documents");
        assert_eq!(settings.store.max_distance, None);
        assert_eq!(settings.store.distance_method, DistanceMethod::L2);
        assert_eq!(settings.backend, BackendSettings::InMemory);
        assert_eq!(settings.embedding, EmbeddingSettings::Hashing { dimension: 128 });
        assert!(!settings.logging.json);
    }

    #[test]
    fn test_full_settings() {
        let settings = Settings::from_toml(
            r#"
            [store]
            index_name = "papers"
            max_distance = 0.4
            distance_method = "cosine"

            [backend]
            type = "qdrant"
            url = "http://qdrant:6334"
            vector_size = 1536

            [embedding]
            type = "open_ai"
            model = "text-embedding-3-large"

            [logging]
            filter = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.store.index_name, "papers");
        assert_eq!(settings.store.max_distance, Some(0.4));
        assert_eq!(settings.store.distance_method, DistanceMethod::Cosine);
        assert_eq!(
            settings.backend,
            BackendSettings::Qdrant {
                url: "http://qdrant:6334".to_string(),
                vector_size: 1536,
            }
        );
        assert_eq!(
            settings.embedding,
            EmbeddingSettings::OpenAi {
                model: "text-embedding-3-large".to_string(),
                api_key: None,
            }
        );
        assert!(settings.logging.json);
    }

    #[test]
    fn test_service_defaults_fill_missing_fields() {
        let settings = Settings::from_toml(
            r#"
            [backend]
            type = "qdrant"
            vector_size = 64

            [embedding]
            type = "open_ai"
            "#,
        )
        .unwrap();

        assert_eq!(
            settings.backend,
            BackendSettings::Qdrant {
                url: "http://localhost:6334".to_string(),
                vector_size: 64,
            }
        );
        assert_eq!(
            settings.embedding,
            EmbeddingSettings::OpenAi {
                model: "text-embedding-3-small".to_string(),
                api_key: None,
            }
        );
    }

    #[test]
    fn test_unknown_distance_method_is_rejected() {
        let result = Settings::from_toml(
            r#"
            [store]
            distance_method = "manhattan"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[store]\nindex_name = \"from-file\"\n\n[embedding]\ntype = \"backend_native\"\ndimension = 16"
        )
        .unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.store.index_name, "from-file");
        assert_eq!(settings.embedding, EmbeddingSettings::BackendNative { dimension: 16 });
    }
}
