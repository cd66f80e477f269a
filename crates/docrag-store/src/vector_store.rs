//! Local vector store implementation

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

use docrag_core::{
    validate_collection_name, CollectionInfo, Error, Result, SearchConfig, SearchResult,
    VectorDocument, VectorStore,
};

use crate::persistence;

/// Cosine similarity of two vectors, 0.0 when either is all zeros
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[derive(Debug, Clone)]
struct Collection {
    dimensions: usize,
    documents: BTreeMap<String, VectorDocument>,
}

impl Collection {
    fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            documents: BTreeMap::new(),
        }
    }

    fn snapshot(&self) -> (usize, Vec<VectorDocument>) {
        (self.dimensions, self.documents.values().cloned().collect())
    }
}

/// In-memory vector store with optional JSON persistence.
///
/// Collections are kept behind a `RwLock`; every mutation writes the affected
/// collection back to `{persist_dir}/{name}/` after the lock is released.
/// Mutations hold `write_order` from snapshot to disk write, so files on disk
/// always reflect the latest snapshot.
pub struct LocalVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    write_order: Mutex<()>,
    persist_dir: Option<PathBuf>,
    connected: bool,
}

impl LocalVectorStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            write_order: Mutex::new(()),
            persist_dir: None,
            connected: false,
        }
    }

    /// Create a store persisted under `dir`; collections are read on `connect`
    pub fn with_persistence(dir: impl Into<PathBuf>) -> Self {
        Self {
            persist_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    /// Open a persisted store and load every collection found under `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::with_persistence(dir);
        store.connect().await?;
        Ok(store)
    }

    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|e| Error::VectorStore(format!("Lock error: {}", e)))
    }

    async fn persist(&self, name: &str, snapshot: Option<(usize, Vec<VectorDocument>)>) -> Result<()> {
        if let (Some(dir), Some((dimensions, documents))) = (&self.persist_dir, snapshot) {
            persistence::save_collection(dir, name, dimensions, &documents).await?;
        }
        Ok(())
    }

    fn check_embeddings(documents: &[VectorDocument]) -> Result<usize> {
        let mut dimensions = None;
        for doc in documents {
            let embedding = doc.embedding.as_ref().ok_or_else(|| {
                Error::VectorStore(format!("Document {} is missing an embedding", doc.id))
            })?;
            if embedding.is_empty() {
                return Err(Error::VectorStore(format!(
                    "Document {} has an empty embedding",
                    doc.id
                )));
            }
            match dimensions {
                None => dimensions = Some(embedding.len()),
                Some(d) if d != embedding.len() => {
                    return Err(Error::VectorStore(format!(
                        "Document {} has dimension {}, expected {}",
                        doc.id,
                        embedding.len(),
                        d
                    )));
                }
                Some(_) => {}
            }
        }
        dimensions.ok_or_else(|| Error::InvalidInput("No documents to store".to_string()))
    }
}

impl Default for LocalVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn connect(&mut self) -> Result<()> {
        if let Some(dir) = &self.persist_dir {
            let stored = persistence::load_collections(dir).await?;
            let mut collections = self.write()?;
            for collection in stored {
                let mut loaded = Collection::new(collection.dimensions);
                for doc in collection.documents {
                    loaded.documents.insert(doc.id.clone(), doc);
                }
                collections.insert(collection.name, loaded);
            }
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        validate_collection_name(name)?;
        if dimensions == 0 {
            return Err(Error::Collection(
                "Collection dimensions must be greater than zero".to_string(),
            ));
        }
        let _ordered = self.write_order.lock().await;

        let snapshot = {
            let mut collections = self.write()?;
            if collections.contains_key(name) {
                return Ok(());
            }
            let collection = Collection::new(dimensions);
            let snapshot = collection.snapshot();
            collections.insert(name.to_string(), collection);
            snapshot
        };

        info!(collection = name, dimensions, "Created collection");
        self.persist(name, Some(snapshot)).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.read()?;
        let mut infos: Vec<CollectionInfo> = collections
            .iter()
            .map(|(name, c)| CollectionInfo {
                name: name.clone(),
                count: c.documents.len(),
                dimensions: c.dimensions,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        let _ordered = self.write_order.lock().await;
        let existed = self.write()?.remove(name).is_some();
        let removed = match &self.persist_dir {
            Some(dir) => persistence::remove_collection(dir, name).await?,
            None => false,
        };
        Ok(existed || removed)
    }

    async fn upsert(&self, collection: &str, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        validate_collection_name(collection)?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let dimensions = Self::check_embeddings(&documents)?;
        let _ordered = self.write_order.lock().await;

        let (ids, snapshot) = {
            let mut collections = self.write()?;
            let target = collections
                .entry(collection.to_string())
                .or_insert_with(|| Collection::new(dimensions));

            if target.dimensions != dimensions {
                return Err(Error::VectorStore(format!(
                    "Collection {} expects dimension {}, got {}",
                    collection, target.dimensions, dimensions
                )));
            }

            let mut ids = Vec::with_capacity(documents.len());
            for mut doc in documents {
                doc.score = None;
                ids.push(doc.id.clone());
                target.documents.insert(doc.id.clone(), doc);
            }
            (ids, target.snapshot())
        };

        debug!(collection, stored = ids.len(), "Upserted chunks");
        self.persist(collection, Some(snapshot)).await?;
        Ok(ids)
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        config: &SearchConfig,
    ) -> Result<SearchResult> {
        let collections = self.read()?;
        let Some(target) = collections.get(collection) else {
            return Ok(SearchResult::empty());
        };

        if vector.len() != target.dimensions {
            return Err(Error::VectorStore(format!(
                "Query has dimension {}, collection {} expects {}",
                vector.len(),
                collection,
                target.dimensions
            )));
        }

        let mut results: Vec<VectorDocument> = target
            .documents
            .values()
            .map(|doc| {
                let score = doc
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(vector, e))
                    .unwrap_or(0.0);
                VectorDocument {
                    embedding: None,
                    score: Some(score),
                    ..doc.clone()
                }
            })
            .filter(|doc| config.accepts(doc))
            .collect();

        results.sort_by(|a, b| {
            b.score
                .unwrap_or(0.0)
                .partial_cmp(&a.score.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        results.truncate(config.top_k);

        let total = results.len();

        Ok(SearchResult {
            documents: results,
            total,
        })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorDocument>> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.documents.get(id))
            .cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let _ordered = self.write_order.lock().await;
        let snapshot = {
            let mut collections = self.write()?;
            match collections.get_mut(collection) {
                Some(target) => target.documents.remove(id).map(|_| target.snapshot()),
                None => None,
            }
        };

        let removed = snapshot.is_some();
        self.persist(collection, snapshot).await?;
        Ok(removed)
    }

    async fn delete_where(&self, collection: &str, key: &str, value: &str) -> Result<usize> {
        let _ordered = self.write_order.lock().await;
        let (removed, snapshot) = {
            let mut collections = self.write()?;
            let Some(target) = collections.get_mut(collection) else {
                return Ok(0);
            };
            let before = target.documents.len();
            target.documents.retain(|_, doc| !doc.metadata_matches(key, value));
            let removed = before - target.documents.len();
            (removed, (removed > 0).then(|| target.snapshot()))
        };

        if removed > 0 {
            info!(collection, key, value, removed, "Deleted chunks");
        }
        self.persist(collection, snapshot).await?;
        Ok(removed)
    }

    async fn documents(&self, collection: &str) -> Result<Vec<VectorDocument>> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map(|c| {
                c.documents
                    .values()
                    .map(|doc| VectorDocument {
                        embedding: None,
                        ..doc.clone()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .read()?
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(id: &str, embedding: Vec<f32>, source: &str) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            content: format!("content of {}", id),
            embedding: Some(embedding),
            metadata: json!({"source": source}),
            score: None,
        }
    }

    async fn connected_store() -> LocalVectorStore {
        let mut store = LocalVectorStore::new();
        store.connect().await.unwrap();
        store
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_upsert_creates_collection_and_replaces_by_id() {
        let store = connected_store().await;
        assert!(store.is_connected());

        store
            .upsert("docs", vec![doc("a", vec![1.0, 0.0], "x.txt")])
            .await
            .unwrap();
        let mut replacement = doc("a", vec![0.0, 1.0], "x.txt");
        replacement.content = "updated".to_string();
        store.upsert("docs", vec![replacement]).await.unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 1);
        assert_eq!(store.get("docs", "a").await.unwrap().unwrap().content, "updated");
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec![CollectionInfo {
                name: "docs".to_string(),
                count: 1,
                dimensions: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_embeddings() {
        let store = connected_store().await;
        store
            .upsert("docs", vec![doc("a", vec![1.0, 0.0], "x.txt")])
            .await
            .unwrap();

        let wrong_dim = store.upsert("docs", vec![doc("b", vec![1.0, 0.0, 0.0], "x.txt")]).await;
        assert!(matches!(wrong_dim, Err(Error::VectorStore(_))));

        let mut missing = doc("c", vec![], "x.txt");
        missing.embedding = None;
        assert!(matches!(
            store.upsert("docs", vec![missing]).await,
            Err(Error::VectorStore(_))
        ));

        assert!(matches!(
            store.upsert("bad name", vec![doc("d", vec![1.0, 0.0], "x.txt")]).await,
            Err(Error::Collection(_))
        ));
    }

    #[tokio::test]
    async fn test_search_orders_filters_and_truncates() {
        let store = connected_store().await;
        store
            .upsert(
                "docs",
                vec![
                    doc("exact", vec![1.0, 0.0], "a.txt"),
                    doc("close", vec![0.8, 0.6], "b.txt"),
                    doc("orthogonal", vec![0.0, 1.0], "a.txt"),
                ],
            )
            .await
            .unwrap();

        let result = store
            .search_by_vector("docs", &[1.0, 0.0], &SearchConfig::with_top_k(2))
            .await
            .unwrap();
        let ids: Vec<&str> = result.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "close"]);
        assert_eq!(result.total, 2);
        assert!(result.documents[0].embedding.is_none());
        assert!((result.documents[1].score.unwrap() - 0.8).abs() < 1e-6);

        let thresholded = SearchConfig {
            top_k: 10,
            score_threshold: Some(0.5),
            filters: Some(vec![("source".to_string(), "a.txt".to_string())]),
        };
        let result = store
            .search_by_vector("docs", &[1.0, 0.0], &thresholded)
            .await
            .unwrap();
        let ids: Vec<&str> = result.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["exact"]);
    }

    #[tokio::test]
    async fn test_search_unknown_collection_and_dimension_mismatch() {
        let store = connected_store().await;
        let empty = store
            .search_by_vector("missing", &[1.0], &SearchConfig::default())
            .await
            .unwrap();
        assert_eq!(empty.total, 0);

        store.create_collection("docs", 2).await.unwrap();
        assert!(store
            .search_by_vector("docs", &[1.0, 0.0, 0.0], &SearchConfig::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_delete_and_delete_where() {
        let store = connected_store().await;
        store
            .upsert(
                "docs",
                vec![
                    doc("a1", vec![1.0, 0.0], "a.txt"),
                    doc("a2", vec![0.5, 0.5], "a.txt"),
                    doc("b1", vec![0.0, 1.0], "b.txt"),
                ],
            )
            .await
            .unwrap();

        assert!(store.delete("docs", "b1").await.unwrap());
        assert!(!store.delete("docs", "b1").await.unwrap());
        assert_eq!(store.delete_where("docs", "source", "a.txt").await.unwrap(), 2);
        assert_eq!(store.delete_where("missing", "source", "a.txt").await.unwrap(), 0);
        assert_eq!(store.count("docs").await.unwrap(), 0);
        assert!(store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() {
        let store = connected_store().await;
        store.create_collection("docs", 2).await.unwrap();
        store.upsert("docs", vec![doc("a", vec![1.0, 0.0], "a.txt")]).await.unwrap();
        store.create_collection("docs", 3).await.unwrap();

        let infos = store.list_collections().await.unwrap();
        assert_eq!(infos[0].dimensions, 2);
        assert_eq!(infos[0].count, 1);
        assert!(store.create_collection("docs2", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalVectorStore::open(dir.path()).await.unwrap();
            store
                .upsert(
                    "dama_dmbok",
                    vec![
                        doc("a", vec![1.0, 0.0], "a.txt"),
                        doc("b", vec![0.0, 1.0], "b.txt"),
                    ],
                )
                .await
                .unwrap();
            store.upsert("other", vec![doc("c", vec![1.0], "c.txt")]).await.unwrap();
            store.delete("dama_dmbok", "b").await.unwrap();
            assert!(store.delete_collection("other").await.unwrap());
        }

        let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
        let names: Vec<String> = reopened
            .list_collections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["dama_dmbok"]);
        assert_eq!(reopened.count("dama_dmbok").await.unwrap(), 1);
        let stored = reopened.get("dama_dmbok", "a").await.unwrap().unwrap();
        assert_eq!(stored.embedding, Some(vec![1.0, 0.0]));
        assert!(!dir.path().join("other").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_chunk_keeps_collection() {
        let store = connected_store().await;
        store
            .upsert("docs", vec![doc("a", vec![1.0, 0.0], "a.txt")])
            .await
            .unwrap();

        assert!(!store.delete("docs", "missing").await.unwrap());
        assert!(!store.delete("nowhere", "a").await.unwrap());
        assert!(store.delete("docs", "a").await.unwrap());
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_leave_latest_snapshot_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let id = format!("chunk-{}", i);
                    store
                        .upsert("docs", vec![doc(&id, vec![1.0, i as f32], "a.txt")])
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = LocalVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("docs").await.unwrap(), 16);
    }
}
