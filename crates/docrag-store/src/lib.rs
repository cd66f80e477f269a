//! Document ingestion and retrieval for docrag
//!
//! This crate provides text chunking, document loaders, content-hash deduplication,
//! vector stores (local with JSON persistence, and Qdrant), the document indexer and
//! the retrieval engine.

pub mod chunker;
pub mod dedup;
pub mod loader;
mod document_indexer;
mod engine;
mod persistence;
mod qdrant;
mod vector_store;

#[cfg(test)]
mod tests;

pub use chunker::TextSplitter;
pub use dedup::{content_hash, existing_hashes, filter_duplicates};
pub use document_indexer::{chunk_id, summarize_documents, LocalDocumentIndexer};
pub use engine::{LocalRAGEngine, CONTEXT_SEPARATOR};
pub use loader::{collect_files, folder_info, load_file};
pub use qdrant::{point_uuid, QdrantVectorStore};
pub use vector_store::{cosine_similarity, LocalVectorStore};

// Re-export core types for convenience
pub use docrag_core::{
    CollectionInfo, CollectionSummary, Document, DocumentIndexer, EmbeddingProvider, Error,
    FolderInfo, FolderReport, IndexingConfig, IndexingResult, RAGEngine, RAGQuery, RAGResult,
    Result, SearchConfig, SearchResult, StoreHealth, VectorDocument, VectorStore,
};
