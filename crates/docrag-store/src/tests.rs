//! Snapshot tests for ingestion and retrieval components

#[cfg(test)]
mod snapshot_tests {
    use crate::{LocalDocumentIndexer, LocalVectorStore, TextSplitter};
    use docrag_core::{
        Document, DocumentIndexer, IndexingConfig, SearchConfig, VectorDocument, VectorStore,
    };
    use docrag_embed::HashEmbeddings;
    use insta::assert_yaml_snapshot;
    use serde_json::json;
    use std::sync::Arc;

    fn handbook_indexer() -> LocalDocumentIndexer<LocalVectorStore, HashEmbeddings> {
        LocalDocumentIndexer::new(
            Arc::new(LocalVectorStore::new()),
            Arc::new(HashEmbeddings::new(32).unwrap()),
            IndexingConfig {
                chunk_size: 40,
                chunk_overlap: 0,
                batch_size: 8,
            },
        )
        .unwrap()
    }

    fn document(source: &str, content: &str) -> Document {
        Document {
            id: source.to_string(),
            title: source.to_string(),
            content: content.to_string(),
            source: source.to_string(),
            metadata: json!({"source": source}),
        }
    }

    const NOTES: &str = "First paragraph about stewardship.\n\nSecond paragraph about lineage.";

    #[test]
    fn test_splitter_snapshot() {
        let splitter = TextSplitter::new(20, 5).unwrap();
        let chunks = splitter.split_text("One two three four five six seven eight");

        assert_yaml_snapshot!(chunks, @r###"
        - One two three four
        - four five six seven
        - eight
        "###);
    }

    #[tokio::test]
    async fn test_document_info_snapshot() {
        let indexer = handbook_indexer();
        indexer
            .index_document("handbook", document("notes.txt", NOTES))
            .await
            .unwrap();
        indexer
            .index_document("handbook", document("guide.md", "Short guide."))
            .await
            .unwrap();

        let info = indexer.document_info(Some("handbook")).await.unwrap();
        assert_yaml_snapshot!(info, @r###"
        total_documents: 2
        documents:
          - source: guide.md
            collection: handbook
            chunks: 1
          - source: notes.txt
            collection: handbook
            chunks: 2
        "###);
    }

    #[tokio::test]
    async fn test_reindex_result_snapshot() {
        let indexer = handbook_indexer();
        indexer
            .index_document("handbook", document("notes.txt", NOTES))
            .await
            .unwrap();
        let again = indexer
            .index_document("handbook", document("notes.txt", NOTES))
            .await
            .unwrap();

        assert_yaml_snapshot!(again, @r###"
        chunks_indexed: 0
        chunks_skipped: 2
        chunks_failed: 0
        errors: []
        "###);
    }

    #[tokio::test]
    async fn test_search_results_snapshot() {
        let mut store = LocalVectorStore::new();
        store.connect().await.unwrap();

        let chunk = |id: &str, embedding: Vec<f32>| VectorDocument {
            id: id.to_string(),
            content: format!("{} chunk", id),
            embedding: Some(embedding),
            metadata: json!({"source": format!("{}.txt", id)}),
            score: None,
        };
        store
            .upsert(
                "handbook",
                vec![
                    chunk("alpha", vec![1.0, 0.0]),
                    chunk("beta", vec![0.0, 1.0]),
                    chunk("gamma", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search_by_vector("handbook", &[1.0, 0.1], &SearchConfig::with_top_k(2))
            .await
            .unwrap();

        assert_yaml_snapshot!(results, {
            ".documents[].score" => "[score]",
        }, @r###"
        documents:
          - id: alpha
            content: alpha chunk
            metadata:
              source: alpha.txt
            score: "[score]"
          - id: gamma
            content: gamma chunk
            metadata:
              source: gamma.txt
            score: "[score]"
        total: 2
        "###);
    }

    #[tokio::test]
    async fn test_collections_snapshot() {
        let indexer = handbook_indexer();
        indexer
            .index_document("handbook", document("notes.txt", NOTES))
            .await
            .unwrap();
        indexer
            .index_document("glossary", document("terms.txt", "Data steward: a role."))
            .await
            .unwrap();

        let stats = indexer.stats().await.unwrap();
        insta::with_settings!({sort_maps => true}, {
            assert_yaml_snapshot!(stats, @r###"
            batch_size: 8
            chunk_overlap: 0
            chunk_size: 40
            collections: 2
            embedding_model: feature-hash-32
            total_chunks: 3
            "###);
        });
    }
}
