//! Vector store trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A chunk stored in the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl VectorDocument {
    /// Read a string field from the metadata
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Cosine distance, the value Chroma-style stores report instead of similarity
    pub fn distance(&self) -> Option<f32> {
        self.score.map(|s| 1.0 - s)
    }

    /// Whether a metadata field matches the given value.
    ///
    /// Non-string values are compared by their JSON rendering, so a filter of
    /// `("page", "3")` matches a numeric `page` of 3.
    pub fn metadata_matches(&self, key: &str, value: &str) -> bool {
        match self.metadata.get(key) {
            Some(serde_json::Value::String(s)) => s == value,
            Some(serde_json::Value::Null) | None => false,
            Some(other) => other.to_string() == value,
        }
    }
}

/// Search result from vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub documents: Vec<VectorDocument>,
    pub total: usize,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total: 0,
        }
    }
}

/// Configuration for vector search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    /// Equality filters on chunk metadata, all of which must match
    pub filters: Option<Vec<(String, String)>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: None,
            filters: None,
        }
    }
}

impl SearchConfig {
    pub fn with_top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Default::default()
        }
    }

    /// Whether a scored chunk passes the threshold and metadata filters
    pub fn accepts(&self, doc: &VectorDocument) -> bool {
        if let Some(threshold) = self.score_threshold {
            if doc.score.unwrap_or(0.0) < threshold {
                return false;
            }
        }
        match &self.filters {
            Some(filters) => filters.iter().all(|(k, v)| doc.metadata_matches(k, v)),
            None => true,
        }
    }
}

/// Summary of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
    pub dimensions: usize,
}

/// Validate a collection name.
///
/// Names become directory names for the local store and collection names on
/// remote servers, so they are limited to ASCII letters, digits, `_` and `-`.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Collection("Collection name must not be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::Collection(format!(
            "Invalid collection name '{}': use letters, digits, '_' or '-'",
            name
        )));
    }
    Ok(())
}

/// Trait for vector stores (local embedded store, Qdrant, ...)
///
/// All operations are scoped to a named collection. Collections are created
/// lazily on the first upsert; reading from a collection that does not exist
/// behaves like reading from an empty one.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Initialize the vector store connection
    async fn connect(&mut self) -> Result<()>;

    /// Check if the vector store is connected
    fn is_connected(&self) -> bool;

    /// Create a collection for vectors of the given length; no-op if it exists
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Whether the collection exists
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// List all collections, sorted by name
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Drop a collection and all its chunks; returns whether it existed
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Insert or replace chunks; every chunk must carry an embedding
    async fn upsert(&self, collection: &str, documents: Vec<VectorDocument>) -> Result<Vec<String>>;

    /// Nearest-neighbour search by cosine similarity
    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        config: &SearchConfig,
    ) -> Result<SearchResult>;

    /// Get a chunk by ID
    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorDocument>>;

    /// Delete a chunk by ID
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Delete every chunk whose metadata `key` equals `value`; returns the count removed
    async fn delete_where(&self, collection: &str, key: &str, value: &str) -> Result<usize>;

    /// All chunks of a collection, without embeddings
    async fn documents(&self, collection: &str) -> Result<Vec<VectorDocument>>;

    /// Number of chunks in a collection
    async fn count(&self, collection: &str) -> Result<usize>;
}
