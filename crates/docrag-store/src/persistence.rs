//! On-disk layout for the local vector store.
//!
//! Each collection lives in its own directory:
//! - `{base}/{name}/metadata.json` - name, dimensions, metric and chunk count
//! - `{base}/{name}/vectors.json` - every chunk with its embedding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use docrag_core::{validate_collection_name, Error, Result, VectorDocument};

const METADATA_FILE: &str = "metadata.json";
const VECTORS_FILE: &str = "vectors.json";

/// Collection metadata stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionMetadata {
    name: String,
    dimensions: usize,
    metric: String,
    count: usize,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

/// A collection as read back from disk
#[derive(Debug)]
pub(crate) struct StoredCollection {
    pub name: String,
    pub dimensions: usize,
    pub documents: Vec<VectorDocument>,
}

/// Write a collection's metadata and vectors
pub(crate) async fn save_collection(
    base_path: &Path,
    name: &str,
    dimensions: usize,
    documents: &[VectorDocument],
) -> Result<()> {
    let collection_path = base_path.join(name);
    tokio::fs::create_dir_all(&collection_path).await?;

    let metadata = CollectionMetadata {
        name: name.to_string(),
        dimensions,
        metric: "cosine".to_string(),
        count: documents.len(),
        updated_at: Utc::now(),
    };

    let metadata_json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| Error::Serialization(format!("Failed to serialize metadata: {}", e)))?;
    tokio::fs::write(collection_path.join(METADATA_FILE), metadata_json).await?;

    let vectors_json = serde_json::to_string(documents)
        .map_err(|e| Error::Serialization(format!("Failed to serialize vectors: {}", e)))?;
    tokio::fs::write(collection_path.join(VECTORS_FILE), vectors_json).await?;

    debug!(name, count = documents.len(), path = ?collection_path, "Saved collection");
    Ok(())
}

/// Remove a collection directory, returning whether it existed
pub(crate) async fn remove_collection(base_path: &Path, name: &str) -> Result<bool> {
    let collection_path = base_path.join(name);
    if !tokio::fs::try_exists(&collection_path).await? {
        return Ok(false);
    }
    tokio::fs::remove_dir_all(&collection_path).await?;
    info!(name, "Removed collection from disk");
    Ok(true)
}

/// Load every collection under `base_path`.
///
/// Directories that fail to parse are skipped with a warning.
pub(crate) async fn load_collections(base_path: &Path) -> Result<Vec<StoredCollection>> {
    if !tokio::fs::try_exists(base_path).await? {
        tokio::fs::create_dir_all(base_path).await?;
        return Ok(Vec::new());
    }

    let mut collections = Vec::new();
    let mut entries = tokio::fs::read_dir(base_path).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if validate_collection_name(&name).is_err() {
            debug!(name, "Ignoring directory that is not a collection");
            continue;
        }

        match load_collection(base_path, &name).await {
            Ok(collection) => collections.push(collection),
            Err(e) => warn!(name, error = %e, "Skipping unreadable collection"),
        }
    }

    collections.sort_by(|a, b| a.name.cmp(&b.name));
    info!(path = ?base_path, collections = collections.len(), "Loaded collections");
    Ok(collections)
}

async fn load_collection(base_path: &Path, name: &str) -> Result<StoredCollection> {
    let collection_path = base_path.join(name);

    let metadata_json = tokio::fs::read_to_string(collection_path.join(METADATA_FILE)).await?;
    let metadata: CollectionMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| Error::Serialization(format!("Invalid collection metadata: {}", e)))?;

    let vectors_path = collection_path.join(VECTORS_FILE);
    let documents: Vec<VectorDocument> = if tokio::fs::try_exists(&vectors_path).await? {
        let vectors_json = tokio::fs::read_to_string(&vectors_path).await?;
        serde_json::from_str(&vectors_json)
            .map_err(|e| Error::Serialization(format!("Invalid collection vectors: {}", e)))?
    } else {
        Vec::new()
    };

    if let Some(bad) = documents.iter().find(|d| {
        d.embedding
            .as_ref()
            .map(|e| e.len() != metadata.dimensions)
            .unwrap_or(true)
    }) {
        return Err(Error::VectorStore(format!(
            "Chunk {} does not match collection dimensions {}",
            bad.id, metadata.dimensions
        )));
    }

    Ok(StoredCollection {
        name: name.to_string(),
        dimensions: metadata.dimensions,
        documents,
    })
}
