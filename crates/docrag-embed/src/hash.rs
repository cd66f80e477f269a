//! Offline feature-hashing embeddings

use async_trait::async_trait;

use docrag_core::{EmbeddingProvider, Error, Result};

/// Deterministic bag-of-words embeddings that need no model or network.
///
/// Words are lowercased and split on anything that is not alphanumeric.
/// Each word adds a signed unit weight at its hashed slot, each bigram adds
/// half a weight, and the vector is L2-normalised. Retrieval quality is far
/// below a trained model but texts sharing vocabulary do score higher.
pub struct HashEmbeddings {
    dimensions: usize,
    model: String,
}

impl HashEmbeddings {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration(
                "Hash embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            model: format!("feature-hash-{}", dimensions),
        })
    }

    fn slot(&self, feature: &str) -> (usize, f32) {
        let digest = md5::compute(feature.as_bytes()).0;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);
        let index = (hash % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Embed one text
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut embedding = vec![0.0f32; self.dimensions];

        for word in &words {
            let (idx, sign) = self.slot(word);
            embedding[idx] += sign;
        }

        for pair in words.windows(2) {
            let (idx, sign) = self.slot(&format!("{} {}", pair[0], pair[1]));
            embedding[idx] += 0.5 * sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in embedding.iter_mut() {
                *val /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_embeddings_are_stable_and_normalised() {
        let embedder = HashEmbeddings::new(64).unwrap();
        let a = embedder.embed_text("Retrieval augmented generation");
        let b = embedder.embed_text("retrieval   AUGMENTED generation!");

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashEmbeddings::new(384).unwrap();
        let query = embedder.embed_text("vector store persistence");
        let related = embedder.embed_text("the vector store writes persistence files to disk");
        let unrelated = embedder.embed_text("bananas grow in tropical climates");

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbeddings::new(8).unwrap();
        assert_eq!(embedder.embed_text("  ... "), vec![0.0; 8]);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(HashEmbeddings::new(0).is_err());
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let embedder = HashEmbeddings::new(32).unwrap();
        let batch = embedder
            .embed_documents(&["alpha beta".to_string(), "gamma".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed_query("gamma").await.unwrap());
        assert_eq!(embedder.dimensions(), Some(32));
    }
}
