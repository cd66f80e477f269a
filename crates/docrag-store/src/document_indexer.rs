//! Document indexer implementation

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use docrag_core::{
    ensure_batch_len, validate_collection_name, CollectionSummary, Document, DocumentIndexer,
    DocumentSummary, EmbeddingProvider, FolderReport, IndexingConfig, IndexingResult, Result,
    VectorDocument, VectorStore,
};

use crate::chunker::TextSplitter;
use crate::dedup::{self, HASH_KEY};
use crate::loader;

/// Chunk id: first 16 hex chars of md5(source), then the content hash
pub fn chunk_id(source: &str, doc_hash: &str) -> String {
    let source_hash = dedup::content_hash(source);
    format!("{}-{}", &source_hash[..16], doc_hash)
}

/// Distinct sources with their chunk counts, for one collection or all of them
pub async fn summarize_documents<V: VectorStore + ?Sized>(
    store: &V,
    collection: Option<&str>,
) -> Result<CollectionSummary> {
    let names: Vec<String> = match collection {
        Some(name) => vec![name.to_string()],
        None => store
            .list_collections()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect(),
    };

    let mut documents = Vec::new();
    for name in names {
        let mut per_source: BTreeMap<String, usize> = BTreeMap::new();
        for chunk in store.documents(&name).await? {
            let source = chunk.metadata_str("source").unwrap_or("unknown").to_string();
            *per_source.entry(source).or_insert(0) += 1;
        }
        documents.extend(per_source.into_iter().map(|(source, chunks)| DocumentSummary {
            source,
            collection: name.clone(),
            chunks,
        }));
    }

    Ok(CollectionSummary {
        total_documents: documents.len(),
        documents,
    })
}

/// Indexer that splits, deduplicates, embeds and stores documents
pub struct LocalDocumentIndexer<V: VectorStore + ?Sized, E: EmbeddingProvider + ?Sized> {
    vector_store: Arc<V>,
    embedder: Arc<E>,
    splitter: TextSplitter,
    config: IndexingConfig,
}

impl<V: VectorStore + ?Sized, E: EmbeddingProvider + ?Sized> LocalDocumentIndexer<V, E> {
    /// Create a new indexer
    pub fn new(vector_store: Arc<V>, embedder: Arc<E>, config: IndexingConfig) -> Result<Self> {
        let splitter = TextSplitter::from_config(&config)?;
        Ok(Self {
            vector_store,
            embedder,
            splitter,
            config: IndexingConfig {
                batch_size: config.batch_size.max(1),
                ..config
            },
        })
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Split a document into chunks carrying the document's metadata
    pub fn chunk_document(&self, document: &Document) -> Vec<VectorDocument> {
        let pieces = self.splitter.split_text(&document.content);
        let total_chunks = pieces.len();
        let indexed_at = Utc::now().to_rfc3339();

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let mut metadata = match &document.metadata {
                    serde_json::Value::Object(map) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                metadata
                    .entry("source")
                    .or_insert_with(|| json!(document.source));
                metadata.insert("title".to_string(), json!(document.title));
                metadata.insert("chunk_index".to_string(), json!(index));
                metadata.insert("total_chunks".to_string(), json!(total_chunks));
                metadata.insert("indexed_at".to_string(), json!(indexed_at));

                VectorDocument {
                    id: String::new(),
                    content,
                    embedding: None,
                    metadata: serde_json::Value::Object(metadata),
                    score: None,
                }
            })
            .collect()
    }

    async fn embed_and_store(
        &self,
        collection: &str,
        batch: Vec<VectorDocument>,
    ) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        ensure_batch_len(texts.len(), &embeddings)?;

        let documents: Vec<VectorDocument> = batch
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorDocument {
                embedding: Some(embedding),
                ..chunk
            })
            .collect();

        let stored = self.vector_store.upsert(collection, documents).await?;
        Ok(stored.len())
    }
}

#[async_trait]
impl<V, E> DocumentIndexer for LocalDocumentIndexer<V, E>
where
    V: VectorStore + ?Sized + 'static,
    E: EmbeddingProvider + ?Sized + 'static,
{
    async fn index_document(&self, collection: &str, document: Document) -> Result<IndexingResult> {
        self.index_documents(collection, vec![document]).await
    }

    async fn index_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<IndexingResult> {
        validate_collection_name(collection)?;

        let chunks: Vec<VectorDocument> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();

        let existing = dedup::existing_hashes(self.vector_store.as_ref(), collection).await?;
        let (mut kept, skipped) = dedup::filter_duplicates(chunks, &existing);

        let mut result = IndexingResult {
            chunks_skipped: skipped,
            ..Default::default()
        };

        if kept.is_empty() {
            info!(collection, skipped, "No new chunks to index");
            return Ok(result);
        }

        for chunk in kept.iter_mut() {
            let source = chunk.metadata_str("source").unwrap_or_default().to_string();
            let hash = chunk.metadata_str(HASH_KEY).unwrap_or_default().to_string();
            chunk.id = chunk_id(&source, &hash);
        }

        let batch_size = self.config.batch_size;
        let mut batches: Vec<Vec<VectorDocument>> = Vec::new();
        let mut remaining = kept.into_iter().peekable();
        while remaining.peek().is_some() {
            batches.push(remaining.by_ref().take(batch_size).collect());
        }

        let total_batches = batches.len();
        for (i, batch) in batches.into_iter().enumerate() {
            let size = batch.len();
            debug!(collection, batch = i + 1, total_batches, size, "Embedding batch");
            match self.embed_and_store(collection, batch).await {
                Ok(stored) => result.chunks_indexed += stored,
                Err(e) => {
                    warn!(collection, batch = i + 1, error = %e, "Failed to index batch");
                    result.chunks_failed += size;
                    result.errors.push(e.to_string());
                }
            }
        }

        info!(
            collection,
            indexed = result.chunks_indexed,
            skipped = result.chunks_skipped,
            failed = result.chunks_failed,
            "Indexed documents"
        );
        Ok(result)
    }

    async fn index_from_file(&self, collection: &str, path: &Path) -> Result<IndexingResult> {
        let documents = loader::load_file(path)?;
        info!(path = %path.display(), parts = documents.len(), "Loaded document");
        self.index_documents(collection, documents).await
    }

    async fn index_folder(
        &self,
        collection: &str,
        folder: &Path,
        extensions: &[String],
    ) -> Result<FolderReport> {
        validate_collection_name(collection)?;
        let files = loader::collect_files(folder, extensions)?;

        let mut report = FolderReport {
            collection: collection.to_string(),
            total_files: files.len(),
            ..Default::default()
        };

        for path in files {
            let name = path.to_string_lossy().to_string();
            match self.index_from_file(collection, &path).await {
                Ok(result) if result.is_success() => {
                    report.processed_files.push(name);
                    report.chunks.merge(result);
                }
                Ok(result) => {
                    let reason = result.errors.join("; ");
                    warn!(path = %name, reason = %reason, "File partially indexed");
                    report.failed_files.push((name, reason));
                    report.chunks.merge(result);
                }
                Err(e) => {
                    warn!(path = %name, error = %e, "Failed to index file");
                    report.failed_files.push((name, e.to_string()));
                }
            }
        }

        info!(
            collection,
            total = report.total_files,
            processed = report.processed(),
            failed = report.failed(),
            "Folder ingestion finished"
        );
        Ok(report)
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize> {
        validate_collection_name(collection)?;
        let removed = self
            .vector_store
            .delete_where(collection, "source", source)
            .await?;
        if removed == 0 {
            warn!(collection, source, "No chunks found for source");
        }
        Ok(removed)
    }

    async fn document_info(&self, collection: Option<&str>) -> Result<CollectionSummary> {
        summarize_documents(self.vector_store.as_ref(), collection).await
    }

    async fn stats(&self) -> Result<serde_json::Value> {
        let collections = self.vector_store.list_collections().await?;
        let total_chunks: usize = collections.iter().map(|c| c.count).sum();

        Ok(json!({
            "collections": collections.len(),
            "total_chunks": total_chunks,
            "embedding_model": self.embedder.model_id(),
            "chunk_size": self.config.chunk_size,
            "chunk_overlap": self.config.chunk_overlap,
            "batch_size": self.config.batch_size,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::LocalVectorStore;
    use docrag_core::Error;
    use docrag_embed::HashEmbeddings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embedder that fails every call
    struct FailingEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbeddings {
        async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("service unavailable".to_string()))
        }

        fn dimensions(&self) -> Option<usize> {
            None
        }

        fn model_id(&self) -> &str {
            "failing"
        }
    }

    /// Embedder that counts how many texts it was asked to embed
    struct CountingEmbeddings {
        inner: HashEmbeddings,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbeddings {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_documents(texts).await
        }

        fn dimensions(&self) -> Option<usize> {
            self.inner.dimensions()
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
    }

    fn small_config() -> IndexingConfig {
        IndexingConfig {
            chunk_size: 60,
            chunk_overlap: 10,
            batch_size: 2,
        }
    }

    fn document(source: &str, content: &str) -> Document {
        Document {
            id: source.to_string(),
            title: source.to_string(),
            content: content.to_string(),
            source: source.to_string(),
            metadata: json!({"source": source, "file_type": "txt"}),
        }
    }

    fn indexer() -> LocalDocumentIndexer<LocalVectorStore, HashEmbeddings> {
        LocalDocumentIndexer::new(
            Arc::new(LocalVectorStore::new()),
            Arc::new(HashEmbeddings::new(64).unwrap()),
            small_config(),
        )
        .unwrap()
    }

    const TEXT: &str = "Metadata management covers business glossaries and lineage. \
        Data quality rules are monitored continuously. \
        Master data keeps reference entities consistent across systems.";

    #[test]
    fn test_chunk_id_format() {
        let id = chunk_id("docs/a.txt", "5d41402abc4b2a76b9719d911017c592");
        let (prefix, hash) = id.split_once('-').unwrap();
        assert_eq!(prefix.len(), 16);
        assert_eq!(hash, "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_chunk_metadata() {
        let indexer = indexer();
        let chunks = indexer.chunk_document(&document("a.txt", TEXT));
        assert!(chunks.len() > 1);
        let last = chunks.last().unwrap();
        assert_eq!(last.metadata["source"], "a.txt");
        assert_eq!(last.metadata["file_type"], "txt");
        assert_eq!(last.metadata["title"], "a.txt");
        assert_eq!(last.metadata["chunk_index"], chunks.len() - 1);
        assert_eq!(last.metadata["total_chunks"], chunks.len());
    }

    #[tokio::test]
    async fn test_reindexing_is_deduplicated() {
        let indexer = indexer();
        let first = indexer
            .index_document("docs", document("a.txt", TEXT))
            .await
            .unwrap();
        assert!(first.chunks_indexed > 1);
        assert_eq!(first.chunks_skipped, 0);

        let second = indexer
            .index_document("docs", document("a.txt", TEXT))
            .await
            .unwrap();
        assert_eq!(second.chunks_indexed, 0);
        assert_eq!(second.chunks_skipped, first.chunks_indexed);
        assert!(second.is_success());

        let stored = indexer.vector_store.documents("docs").await.unwrap();
        assert_eq!(stored.len(), first.chunks_indexed);
        for chunk in &stored {
            let hash = chunk.metadata_str(HASH_KEY).unwrap();
            assert_eq!(chunk.id, chunk_id("a.txt", hash));
        }
    }

    #[tokio::test]
    async fn test_batches_follow_batch_size() {
        let embedder = Arc::new(CountingEmbeddings {
            inner: HashEmbeddings::new(16).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let indexer = LocalDocumentIndexer::new(
            Arc::new(LocalVectorStore::new()),
            embedder.clone(),
            small_config(),
        )
        .unwrap();

        let result = indexer
            .index_document("docs", document("a.txt", TEXT))
            .await
            .unwrap();
        let expected_batches = result.chunks_indexed.div_ceil(2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), expected_batches);
    }

    #[tokio::test]
    async fn test_embedding_failures_are_reported() {
        let indexer = LocalDocumentIndexer::new(
            Arc::new(LocalVectorStore::new()),
            Arc::new(FailingEmbeddings),
            small_config(),
        )
        .unwrap();

        let result = indexer
            .index_document("docs", document("a.txt", TEXT))
            .await
            .unwrap();
        assert_eq!(result.chunks_indexed, 0);
        assert!(result.chunks_failed > 0);
        assert!(result.errors[0].contains("service unavailable"));
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_delete_source_and_document_info() {
        let indexer = indexer();
        indexer
            .index_document("docs", document("a.txt", "Alpha document body"))
            .await
            .unwrap();
        indexer
            .index_document("docs", document("b.txt", "Beta document body"))
            .await
            .unwrap();
        indexer
            .index_document("notes", document("c.txt", "Gamma notes"))
            .await
            .unwrap();

        let docs = indexer.document_info(Some("docs")).await.unwrap();
        assert_eq!(docs.total_documents, 2);
        assert_eq!(docs.documents[0].source, "a.txt");
        assert_eq!(docs.documents[0].chunks, 1);

        let all = indexer.document_info(None).await.unwrap();
        assert_eq!(all.total_documents, 3);
        assert_eq!(all.documents[2].collection, "notes");

        assert_eq!(indexer.delete_source("docs", "a.txt").await.unwrap(), 1);
        assert_eq!(indexer.delete_source("docs", "a.txt").await.unwrap(), 0);
        assert_eq!(indexer.document_info(Some("docs")).await.unwrap().total_documents, 1);
    }

    #[tokio::test]
    async fn test_index_folder_records_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("good.txt"), "Governance policies and standards").unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   ").unwrap();
        std::fs::write(dir.path().join("ignored.csv"), "a,b").unwrap();

        let indexer = indexer();
        let report = indexer
            .index_folder("docs", dir.path(), &["txt".to_string()])
            .await
            .unwrap();

        assert_eq!(report.total_files, 2);
        assert_eq!(report.processed(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.failed_files[0].0.ends_with("empty.txt"));
        assert_eq!(report.chunks.chunks_indexed, 1);
    }

    #[tokio::test]
    async fn test_invalid_collection_name() {
        let indexer = indexer();
        let err = indexer
            .index_document("no/slashes", document("a.txt", TEXT))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Collection(_)));
    }
}
