//! Document indexer trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// A document to be indexed, usually one file or one page of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Where the text came from; chunks are listed and deleted by source
    pub source: String,
    pub metadata: serde_json::Value,
}

/// Result of an indexing operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingResult {
    pub chunks_indexed: usize,
    /// Chunks dropped because identical content already exists in the collection
    pub chunks_skipped: usize,
    pub chunks_failed: usize,
    pub errors: Vec<String>,
}

impl IndexingResult {
    /// Fold another result into this one
    pub fn merge(&mut self, other: IndexingResult) {
        self.chunks_indexed += other.chunks_indexed;
        self.chunks_skipped += other.chunks_skipped;
        self.chunks_failed += other.chunks_failed;
        self.errors.extend(other.errors);
    }

    pub fn is_success(&self) -> bool {
        self.chunks_failed == 0
    }
}

/// Configuration for document indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 32,
        }
    }
}

/// Outcome of ingesting every matching file below a folder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderReport {
    pub collection: String,
    pub total_files: usize,
    pub processed_files: Vec<String>,
    pub failed_files: Vec<(String, String)>,
    pub chunks: IndexingResult,
}

impl FolderReport {
    pub fn processed(&self) -> usize {
        self.processed_files.len()
    }

    pub fn failed(&self) -> usize {
        self.failed_files.len()
    }
}

/// A file matched for folder ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

/// Files a folder ingestion would pick up, without loading them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderInfo {
    pub folder: String,
    pub extensions: Vec<String>,
    pub files: Vec<FileEntry>,
    pub total_size: u64,
}

impl FolderInfo {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }
}

/// One source document inside a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source: String,
    pub collection: String,
    pub chunks: usize,
}

/// Distinct documents stored in one or more collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub total_documents: usize,
    pub documents: Vec<DocumentSummary>,
}

/// Trait for document indexers
///
/// An indexer turns files into chunks, drops chunks whose content is already
/// stored, embeds the rest and writes them to a collection.
#[async_trait]
pub trait DocumentIndexer: Send + Sync {
    /// Index a single document
    async fn index_document(&self, collection: &str, document: Document) -> Result<IndexingResult>;

    /// Index multiple documents
    async fn index_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<IndexingResult>;

    /// Load and index a local file
    async fn index_from_file(&self, collection: &str, path: &Path) -> Result<IndexingResult>;

    /// Index every file under `folder` whose extension is listed
    async fn index_folder(
        &self,
        collection: &str,
        folder: &Path,
        extensions: &[String],
    ) -> Result<FolderReport>;

    /// Remove every chunk loaded from `source`; returns the number removed
    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize>;

    /// Documents per source, for one collection or all of them
    async fn document_info(&self, collection: Option<&str>) -> Result<CollectionSummary>;

    /// Get indexing statistics
    async fn stats(&self) -> Result<serde_json::Value>;
}
