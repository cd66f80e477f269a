//! Embedding provider trait

use async_trait::async_trait;

use crate::{Error, Result};

/// Trait for embedding models (hosted APIs or local functions)
///
/// Implementations turn text into fixed-length vectors. The same provider must be
/// used for indexing and querying a collection, otherwise similarity scores are
/// meaningless.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Authenticate with the provider, if it needs a session token
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Embed a batch of texts, returning one vector per input in input order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Provider returned no vector for query".to_string()))
    }

    /// Vector length, when known ahead of the first call
    fn dimensions(&self) -> Option<usize>;

    /// Model identifier used for the embeddings
    fn model_id(&self) -> &str;
}

/// Check that a provider honoured the one-vector-per-input contract
pub fn ensure_batch_len(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "Expected {} embeddings, provider returned {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        if vectors.iter().any(|v| v.len() != first.len() || v.is_empty()) {
            return Err(Error::Embedding(
                "Provider returned vectors of inconsistent length".to_string(),
            ));
        }
    }
    Ok(())
}
