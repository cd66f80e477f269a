//! RAG engine implementation

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use docrag_core::{
    EmbeddingProvider, Error, RAGEngine, RAGQuery, RAGResult, Result, SearchConfig, StoreHealth,
    VectorDocument, VectorStore,
};

/// Separator placed between retrieved chunks in the prompt context
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n";

const HEALTH_PROBE: &str = "test";

/// Local RAG engine implementation
pub struct LocalRAGEngine<V: VectorStore + ?Sized, E: EmbeddingProvider + ?Sized> {
    vector_store: Arc<V>,
    embedder: Arc<E>,
    initialized: bool,
}

impl<V: VectorStore + ?Sized, E: EmbeddingProvider + ?Sized> LocalRAGEngine<V, E> {
    /// Create a new local RAG engine
    pub fn new(vector_store: Arc<V>, embedder: Arc<E>) -> Self {
        Self {
            vector_store,
            embedder,
            initialized: false,
        }
    }

    fn search_config(query: &RAGQuery) -> SearchConfig {
        SearchConfig {
            top_k: query.top_k,
            score_threshold: query.score_threshold,
            filters: query.filters.clone(),
        }
    }
}

/// Collapse newlines so each chunk reads as one paragraph
fn flatten(text: &str) -> String {
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl<V, E> RAGEngine for LocalRAGEngine<V, E>
where
    V: VectorStore + ?Sized + 'static,
    E: EmbeddingProvider + ?Sized + 'static,
{
    async fn initialize(&mut self) -> Result<()> {
        if !self.vector_store.is_connected() {
            return Err(Error::VectorStore("Vector store not connected".to_string()));
        }

        self.initialized = true;
        Ok(())
    }

    async fn retrieve(&self, query: &RAGQuery) -> Result<RAGResult> {
        if !self.initialized {
            return Err(Error::Other("RAG engine not initialized".to_string()));
        }
        if query.query.trim().is_empty() {
            return Err(Error::InvalidInput("Query must not be empty".to_string()));
        }

        let vector = self.embedder.embed_query(&query.query).await?;
        let search_result = self
            .vector_store
            .search_by_vector(&query.collection, &vector, &Self::search_config(query))
            .await?;

        debug!(
            collection = %query.collection,
            hits = search_result.total,
            "Retrieved chunks"
        );

        let context = self.build_context(&search_result.documents);

        Ok(RAGResult {
            documents: search_result.documents,
            context,
            metadata: Some(json!({
                "query": query.query,
                "collection": query.collection,
                "top_k": query.top_k,
                "results_count": search_result.total,
            })),
        })
    }

    fn build_context(&self, documents: &[VectorDocument]) -> String {
        documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                format!(
                    "Source {}: {} (relevance: {:.3})\n{}",
                    i + 1,
                    doc.metadata_str("source").unwrap_or("unknown"),
                    doc.score.unwrap_or(0.0),
                    flatten(&doc.content)
                )
            })
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }

    async fn enhance_prompt(&self, prompt: &str, query: &RAGQuery) -> Result<String> {
        let rag_result = self.retrieve(query).await?;
        if rag_result.context.is_empty() {
            return Ok(prompt.to_string());
        }

        let mut enhanced = String::new();
        enhanced.push_str(&rag_result.context);
        enhanced.push_str("\n---\n\n");
        enhanced.push_str(prompt);

        Ok(enhanced)
    }

    async fn health(&self, collections: &[String]) -> Result<Vec<StoreHealth>> {
        let probe = self.embedder.embed_query(HEALTH_PROBE).await;
        let mut report = Vec::with_capacity(collections.len());

        for collection in collections {
            let count = match self.vector_store.count(collection).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Collection unavailable");
                    report.push(StoreHealth {
                        collection: collection.clone(),
                        count: 0,
                        searchable: false,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let search = match &probe {
                Ok(vector) => self
                    .vector_store
                    .search_by_vector(collection, vector, &SearchConfig::with_top_k(1))
                    .await
                    .map(|_| ()),
                Err(e) => Err(Error::Embedding(e.to_string())),
            };

            report.push(StoreHealth {
                collection: collection.clone(),
                count,
                searchable: search.is_ok(),
                error: search.err().map(|e| e.to_string()),
            });
        }

        Ok(report)
    }

    async fn stats(&self) -> Result<serde_json::Value> {
        let collections = self.vector_store.list_collections().await?;

        Ok(json!({
            "initialized": self.initialized,
            "embedding_model": self.embedder.model_id(),
            "collections": collections,
        }))
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.vector_store.is_connected()
    }
}
