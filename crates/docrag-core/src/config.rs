//! Runtime configuration for ingestion and retrieval

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, IndexingConfig, Result};

/// Default directory for the local vector store
pub const DEFAULT_PERSIST_DIR: &str = "chroma_db";

/// Which vector store backs the collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Embedded store persisted under `persist_dir`
    Local,
    /// Remote Qdrant server
    Qdrant { url: String, api_key: Option<String> },
}

/// Configuration shared by the indexer, the stores and the retrieval engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub persist_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub backend: StoreBackend,
    pub extensions: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from(DEFAULT_PERSIST_DIR),
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 32,
            top_k: 5,
            score_threshold: None,
            backend: StoreBackend::Local,
            extensions: ["pdf", "doc", "docx", "txt", "md", "html"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl RagConfig {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(dir) = env::var("DOCRAG_PERSIST_DIR") {
            config.persist_dir = PathBuf::from(dir);
        }
        if let Some(size) = parse_var("DOCRAG_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(overlap) = parse_var("DOCRAG_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }
        if let Some(batch) = parse_var("DOCRAG_BATCH_SIZE")? {
            config.batch_size = batch;
        }
        if let Some(top_k) = parse_var("DOCRAG_TOP_K")? {
            config.top_k = top_k;
        }
        config.score_threshold = parse_var("DOCRAG_SCORE_THRESHOLD")?;

        if let Ok(url) = env::var("QDRANT_URL") {
            url::Url::parse(&url)
                .map_err(|e| Error::Configuration(format!("QDRANT_URL is not a valid URL: {}", e)))?;
            config.backend = StoreBackend::Qdrant {
                url,
                api_key: env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty()),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the chunker and search rely on
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be greater than 0".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be greater than 0".to_string()));
        }
        if self.top_k == 0 {
            return Err(Error::Configuration("top_k must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Indexing parameters derived from this configuration
    pub fn indexing_config(&self) -> IndexingConfig {
        IndexingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            batch_size: self.batch_size,
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("{} has invalid value '{}': {}", name, raw, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.backend, StoreBackend::Local);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let config = RagConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_indexing_config_mirrors_chunking() {
        let config = RagConfig {
            chunk_size: 500,
            chunk_overlap: 50,
            batch_size: 8,
            ..Default::default()
        };
        let indexing = config.indexing_config();
        assert_eq!(indexing.chunk_size, 500);
        assert_eq!(indexing.chunk_overlap, 50);
        assert_eq!(indexing.batch_size, 8);
    }
}
