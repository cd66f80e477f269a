//! Qdrant-backed vector store

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue,
        vectors_config::Config, Condition, CountPointsBuilder, CreateCollectionBuilder,
        DeletePointsBuilder, Distance, FieldCondition, Filter, GetPointsBuilder, Match, PointId,
        PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use docrag_core::{
    validate_collection_name, CollectionInfo, Error, Result, SearchConfig, SearchResult,
    VectorDocument, VectorStore,
};

const CONTENT_KEY: &str = "content";
const CHUNK_ID_KEY: &str = "chunk_id";
const SCROLL_PAGE: u32 = 256;

/// Qdrant point ids must be integers or UUIDs, so chunk ids are mapped to the
/// UUID built from their md5 digest
pub fn point_uuid(chunk_id: &str) -> String {
    Uuid::from_bytes(md5::compute(chunk_id.as_bytes()).0).to_string()
}

fn store_err(action: &str) -> impl Fn(qdrant_client::QdrantError) -> Error + '_ {
    move |e| Error::VectorStore(format!("Failed to {}: {}", action, e))
}

fn field_match(key: &str, match_value: MatchValue) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(match_value),
            }),
            ..Default::default()
        })),
    }
}

/// Equality on a payload field. Values that parse as integers or booleans also
/// match payloads of that type, the way the local store compares JSON renderings.
fn match_condition(key: &str, value: &str) -> Condition {
    let keyword = field_match(key, MatchValue::Keyword(value.to_string()));
    let typed = if let Ok(number) = value.parse::<i64>() {
        MatchValue::Integer(number)
    } else if let Ok(flag) = value.parse::<bool>() {
        MatchValue::Boolean(flag)
    } else {
        return keyword;
    };

    Condition {
        condition_one_of: Some(ConditionOneOf::Filter(Filter::should([
            keyword,
            field_match(key, typed),
        ]))),
    }
}

fn build_payload(doc: &VectorDocument) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    if let Some(metadata) = doc.metadata.as_object() {
        for (key, value) in metadata {
            payload.insert(key.clone(), value.clone().into());
        }
    }
    payload.insert(CONTENT_KEY.to_string(), doc.content.clone().into());
    payload.insert(CHUNK_ID_KEY.to_string(), doc.id.clone().into());
    payload
}

fn payload_to_document(
    mut payload: HashMap<String, Value>,
    point_id: Option<PointId>,
    score: Option<f32>,
) -> VectorDocument {
    let content = payload
        .remove(CONTENT_KEY)
        .and_then(|v| v.as_str().cloned())
        .unwrap_or_default();

    let id = payload
        .remove(CHUNK_ID_KEY)
        .and_then(|v| v.as_str().cloned())
        .or_else(|| match point_id?.point_id_options? {
            PointIdOptions::Num(num) => Some(num.to_string()),
            PointIdOptions::Uuid(uuid) => Some(uuid),
        })
        .unwrap_or_default();

    let metadata: serde_json::Map<String, serde_json::Value> = payload
        .into_iter()
        .map(|(key, value)| (key, serde_json::Value::from(value)))
        .collect();

    VectorDocument {
        id,
        content,
        embedding: None,
        metadata: serde_json::Value::Object(metadata),
        score,
    }
}

/// Qdrant vector store implementation.
///
/// Collections use cosine distance. Requires a running Qdrant instance.
pub struct QdrantVectorStore {
    client: Qdrant,
    url: String,
    connected: bool,
}

impl QdrantVectorStore {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let url = url.into();
        let mut builder = Qdrant::from_url(&url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            url,
            connected: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(store_err("list collections"))?;
        Ok(collections.collections.iter().any(|c| c.name == name))
    }

    async fn exact_count(&self, collection: &str, filter: Option<Filter>) -> Result<usize> {
        let mut request = CountPointsBuilder::new(collection).exact(true);
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        let response = self
            .client
            .count(request)
            .await
            .map_err(store_err("count points"))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn connect(&mut self) -> Result<()> {
        self.client
            .health_check()
            .await
            .map_err(|e| Error::Network(format!("Qdrant at {} is unreachable: {}", self.url, e)))?;
        self.connected = true;
        info!(url = %self.url, "Connected to Qdrant");
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
        if self.exists(name).await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(store_err("create collection"))?;

        info!(collection = name, dimensions, "Created collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.exists(name).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(store_err("list collections"))?;

        let mut result = Vec::new();
        for col in collections.collections {
            if let Ok(info) = self.client.collection_info(&col.name).await {
                let Some(info) = info.result else {
                    continue;
                };
                let count = info.points_count.unwrap_or(0) as usize;
                let dimensions = info
                    .config
                    .and_then(|c| c.params)
                    .and_then(|p| p.vectors_config)
                    .and_then(|v| match v.config {
                        Some(Config::Params(p)) => Some(p.size as usize),
                        _ => None,
                    })
                    .unwrap_or(0);
                result.push(CollectionInfo {
                    name: col.name,
                    count,
                    dimensions,
                });
            }
        }

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        if !self.exists(name).await? {
            return Ok(false);
        }
        self.client
            .delete_collection(name)
            .await
            .map_err(store_err("delete collection"))?;
        Ok(true)
    }

    async fn upsert(&self, collection: &str, documents: Vec<VectorDocument>) -> Result<Vec<String>> {
        validate_collection_name(collection)?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut points = Vec::with_capacity(documents.len());
        let mut ids = Vec::with_capacity(documents.len());
        let mut dimensions = None;

        for document in &documents {
            let embedding = document.embedding.as_ref().ok_or_else(|| {
                Error::VectorStore(format!("Document {} is missing an embedding", document.id))
            })?;
            match dimensions {
                None => dimensions = Some(embedding.len()),
                Some(d) if d != embedding.len() => {
                    return Err(Error::VectorStore(format!(
                        "Document {} has dimension {}, expected {}",
                        document.id,
                        embedding.len(),
                        d
                    )));
                }
                Some(_) => {}
            }

            points.push(PointStruct::new(
                point_uuid(&document.id),
                embedding.clone(),
                build_payload(document),
            ));
            ids.push(document.id.clone());
        }

        if let Some(dimensions) = dimensions {
            self.create_collection(collection, dimensions).await?;
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(store_err("upsert points"))?;

        debug!(collection, stored = ids.len(), "Upserted chunks");
        Ok(ids)
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        config: &SearchConfig,
    ) -> Result<SearchResult> {
        if !self.exists(collection).await? {
            return Ok(SearchResult::empty());
        }

        let mut search_builder =
            SearchPointsBuilder::new(collection, vector.to_vec(), config.top_k as u64);
        if let Some(threshold) = config.score_threshold {
            search_builder = search_builder.score_threshold(threshold);
        }
        if let Some(filters) = config.filters.as_ref().filter(|f| !f.is_empty()) {
            let conditions: Vec<Condition> = filters
                .iter()
                .map(|(key, value)| match_condition(key, value))
                .collect();
            search_builder = search_builder.filter(Filter::must(conditions));
        }

        let response = self
            .client
            .search_points(search_builder.with_payload(true))
            .await
            .map_err(store_err("search"))?;

        let documents: Vec<VectorDocument> = response
            .result
            .into_iter()
            .map(|point| payload_to_document(point.payload, point.id, Some(point.score)))
            .collect();
        let total = documents.len();

        Ok(SearchResult { documents, total })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorDocument>> {
        if !self.exists(collection).await? {
            return Ok(None);
        }
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(collection, vec![PointId::from(point_uuid(id))])
                    .with_payload(true),
            )
            .await
            .map_err(store_err("get point"))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .map(|point| payload_to_document(point.payload, point.id, None)))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        if self.get(collection, id).await?.is_none() {
            return Ok(false);
        }
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(vec![PointId::from(point_uuid(id))])
                    .wait(true),
            )
            .await
            .map_err(store_err("delete point"))?;
        Ok(true)
    }

    async fn delete_where(&self, collection: &str, key: &str, value: &str) -> Result<usize> {
        if !self.exists(collection).await? {
            return Ok(0);
        }

        let filter = Filter::must([match_condition(key, value)]);
        let matching = self.exact_count(collection, Some(filter.clone())).await?;
        if matching == 0 {
            return Ok(0);
        }

        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter).wait(true))
            .await
            .map_err(store_err("delete points"))?;

        info!(collection, key, value, removed = matching, "Deleted chunks");
        Ok(matching)
    }

    async fn documents(&self, collection: &str) -> Result<Vec<VectorDocument>> {
        if !self.exists(collection).await? {
            return Ok(Vec::new());
        }

        let mut documents = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(collection)
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let response = self
                .client
                .scroll(request)
                .await
                .map_err(store_err("scroll points"))?;

            documents.extend(
                response
                    .result
                    .into_iter()
                    .map(|point| payload_to_document(point.payload, point.id, None)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        if !self.exists(collection).await? {
            return Ok(0);
        }
        self.exact_count(collection, None).await
    }
}
