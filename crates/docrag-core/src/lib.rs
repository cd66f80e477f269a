//! Core traits and types for docrag
//!
//! This crate defines the fundamental traits and types used across the docrag system.
//! It provides capability-facing interfaces for embedding providers, vector stores,
//! document indexers and retrieval engines, making the system test-friendly and extensible.

pub mod config;
pub mod document_indexer;
pub mod embeddings;
pub mod error;
pub mod rag;
pub mod vector_store;


pub use config::{RagConfig, StoreBackend, DEFAULT_PERSIST_DIR};
pub use document_indexer::{
    CollectionSummary, Document, DocumentIndexer, DocumentSummary, FileEntry, FolderInfo,
    FolderReport, IndexingConfig, IndexingResult,
};
pub use embeddings::{ensure_batch_len, EmbeddingProvider};
pub use error::{Error, Result};
pub use rag::{RAGEngine, RAGQuery, RAGResult, StoreHealth};
pub use vector_store::{
    validate_collection_name, CollectionInfo, SearchConfig, SearchResult, VectorDocument,
    VectorStore,
};
