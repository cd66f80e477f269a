//! RAG (Retrieval-Augmented Generation) engine trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Result, VectorDocument};

/// Query for RAG retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGQuery {
    pub query: String,
    pub collection: String,
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub filters: Option<Vec<(String, String)>>,
}

impl Default for RAGQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            collection: String::new(),
            top_k: 5,
            score_threshold: None,
            filters: None,
        }
    }
}

impl RAGQuery {
    pub fn new(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            collection: collection.into(),
            ..Default::default()
        }
    }
}

/// Result from RAG retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGResult {
    pub documents: Vec<VectorDocument>,
    pub context: String,
    pub metadata: Option<serde_json::Value>,
}

/// Health of a single collection as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub collection: String,
    pub count: usize,
    /// A probe query returned without error
    pub searchable: bool,
    pub error: Option<String>,
}

/// Trait for RAG engines
///
/// This trait defines the interface for retrieving chunks relevant to a query
/// and turning them into prompt context.
#[async_trait]
pub trait RAGEngine: Send + Sync {
    /// Initialize the RAG engine
    async fn initialize(&mut self) -> Result<()>;

    /// Retrieve relevant chunks for a query
    async fn retrieve(&self, query: &RAGQuery) -> Result<RAGResult>;

    /// Build context from retrieved chunks
    fn build_context(&self, documents: &[VectorDocument]) -> String;

    /// Enhance a prompt with RAG context
    async fn enhance_prompt(&self, prompt: &str, query: &RAGQuery) -> Result<String>;

    /// Probe each collection: chunk count and a test search
    async fn health(&self, collections: &[String]) -> Result<Vec<StoreHealth>>;

    /// Get statistics about the RAG engine
    async fn stats(&self) -> Result<serde_json::Value>;

    /// Check if the RAG engine is ready
    fn is_ready(&self) -> bool;
}
