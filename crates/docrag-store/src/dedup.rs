//! Content-hash deduplication of chunks

use serde_json::json;
use std::collections::HashSet;

use docrag_core::{Result, VectorDocument, VectorStore};

/// Metadata key holding a chunk's content hash
pub const HASH_KEY: &str = "doc_hash";

/// Lowercase hex md5 of the text
pub fn content_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Drop chunks already present in the collection or repeated within the batch.
///
/// Kept chunks get their hash stamped into metadata under [`HASH_KEY`].
/// Returns the kept chunks and the number skipped.
pub fn filter_duplicates(
    chunks: Vec<VectorDocument>,
    existing: &HashSet<String>,
) -> (Vec<VectorDocument>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(chunks.len());
    let mut skipped = 0;

    for mut chunk in chunks {
        let hash = content_hash(&chunk.content);
        if existing.contains(&hash) || !seen.insert(hash.clone()) {
            skipped += 1;
            continue;
        }
        if !chunk.metadata.is_object() {
            chunk.metadata = json!({});
        }
        chunk.metadata[HASH_KEY] = json!(hash);
        kept.push(chunk);
    }

    (kept, skipped)
}

/// Hashes of every chunk stored in `collection`
pub async fn existing_hashes<V: VectorStore + ?Sized>(
    store: &V,
    collection: &str,
) -> Result<HashSet<String>> {
    let documents = store.documents(collection).await?;
    Ok(documents
        .iter()
        .map(|doc| {
            doc.metadata_str(HASH_KEY)
                .map(str::to_string)
                .unwrap_or_else(|| content_hash(&doc.content))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> VectorDocument {
        VectorDocument {
            id: content.to_string(),
            content: content.to_string(),
            embedding: None,
            metadata: json!({"source": "a.txt"}),
            score: None,
        }
    }

    #[test]
    fn test_content_hash_is_md5_hex() {
        assert_eq!(content_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(content_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_filter_duplicates_within_batch_and_store() {
        let existing: HashSet<String> = [content_hash("old")].into_iter().collect();
        let (kept, skipped) = filter_duplicates(
            vec![chunk("old"), chunk("new"), chunk("new"), chunk("other")],
            &existing,
        );

        assert_eq!(skipped, 2);
        let contents: Vec<&str> = kept.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["new", "other"]);
        assert_eq!(kept[0].metadata_str(HASH_KEY), Some(content_hash("new").as_str()));
        assert_eq!(kept[0].metadata_str("source"), Some("a.txt"));
    }
}
