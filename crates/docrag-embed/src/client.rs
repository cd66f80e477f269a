//! HTTP embedding clients

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use docrag_core::{EmbeddingProvider, Error, Result, ensure_batch_len};

use crate::config::EmbeddingConfig;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Serialize)]
struct FeatureExtractionOptions {
    wait_for_model: bool,
}

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
    options: FeatureExtractionOptions,
}

/// The feature-extraction pipeline returns pooled sentence vectors for
/// sentence-transformers models and per-token vectors for plain encoders.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Pooled(Vec<Vec<f32>>),
    TokenLevel(Vec<Vec<Vec<f32>>>),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix epoch milliseconds
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Tokens are refreshed this long before their stated expiry
const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;

struct AccessToken {
    value: String,
    expires_at: Option<i64>,
}

impl AccessToken {
    fn is_fresh(&self, now_ms: i64) -> bool {
        self.expires_at
            .map(|expires_at| now_ms + TOKEN_REFRESH_MARGIN_MS < expires_at)
            .unwrap_or(true)
    }
}

fn build_http_client(config: &EmbeddingConfig, accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| Error::Network(e.to_string()))
}

fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("Embedding request timed out: {}", err))
    } else {
        Error::Network(err.to_string())
    }
}

/// Send a request and decode a JSON body, turning non-2xx replies into errors
async fn send_json<T: for<'de> Deserialize<'de>>(request: RequestBuilder, what: &str) -> Result<T> {
    let response = request.send().await.map_err(map_transport_error)?;
    decode_json(response, what).await
}

async fn decode_json<T: for<'de> Deserialize<'de>>(response: Response, what: &str) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(Error::Embedding(format!(
            "{} request failed with status {}: {}",
            what, status, error_text
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::Serialization(format!("Invalid {} response: {}", what, e)))
}

/// Put OpenAI-style results back into input order
fn ordered_vectors(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    data.sort_by_key(|d| d.index);
    let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
    ensure_batch_len(expected, &vectors)?;
    Ok(vectors)
}

/// Average token vectors into one sentence vector
fn mean_pool(tokens: Vec<Vec<f32>>) -> Vec<f32> {
    let Some(width) = tokens.first().map(|t| t.len()) else {
        return Vec::new();
    };
    let mut pooled = vec![0.0; width];
    for token in &tokens {
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
    }
    let n = tokens.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= n);
    pooled
}

/// Client for OpenAI-compatible `/v1/embeddings` endpoints
pub struct OpenAiEmbeddings {
    config: EmbeddingConfig,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = build_http_client(&config, false)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.config.api_url);
        debug!(url = %url, inputs = texts.len(), "Requesting embeddings");

        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response: EmbeddingResponse = send_json(request, "Embeddings").await?;
        ordered_vectors(response.data, texts.len())
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

/// Client for the HuggingFace inference API
pub struct HuggingFaceEmbeddings {
    config: EmbeddingConfig,
    client: Client,
}

impl HuggingFaceEmbeddings {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(Error::Configuration(
                "HuggingFace embeddings require an API token".to_string(),
            ));
        }
        let client = build_http_client(&config, false)?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.config.api_url, self.config.model
        );
        debug!(url = %url, inputs = texts.len(), "Requesting embeddings");

        let mut request = self.client.post(&url).json(&FeatureExtractionRequest {
            inputs: texts,
            options: FeatureExtractionOptions {
                wait_for_model: true,
            },
        });
        if let Some(token) = &self.config.api_key {
            request = request.bearer_auth(token);
        }

        let vectors = match send_json::<FeatureExtraction>(request, "Feature extraction").await? {
            FeatureExtraction::Pooled(vectors) => vectors,
            FeatureExtraction::TokenLevel(per_text) => per_text.into_iter().map(mean_pool).collect(),
        };

        ensure_batch_len(texts.len(), &vectors)?;
        Ok(vectors)
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

/// Client for the GigaChat embeddings API
///
/// The authorization key is exchanged for a short-lived access token in
/// [`EmbeddingProvider::connect`]. The token is renewed shortly before its
/// `expires_at`, and once more if the API answers 401. GigaChat serves its API with certificates
/// issued by a national CA that is absent from common trust stores, so
/// certificate verification is disabled for this client.
pub struct GigaChatEmbeddings {
    config: EmbeddingConfig,
    token: RwLock<Option<AccessToken>>,
    client: Client,
}

impl GigaChatEmbeddings {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(Error::Configuration(
                "GigaChat embeddings require an authorization key".to_string(),
            ));
        }
        let client = build_http_client(&config, true)?;
        Ok(Self {
            config,
            token: RwLock::new(None),
            client,
        })
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Exchange the authorization key for a new access token
    async fn authenticate(&self) -> Result<String> {
        let auth_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Authentication("Missing GigaChat authorization key".to_string()))?;

        let response = self
            .client
            .post(&self.config.oauth_url)
            .header("Authorization", format!("Basic {}", auth_key))
            .header("RqUID", Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.config.scope.as_str())])
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(Error::Authentication(format!(
                "Authentication failed: {}",
                response.status()
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let value = token_response.access_token.clone();
        *self.token.write().await = Some(AccessToken {
            value: token_response.access_token,
            expires_at: token_response.expires_at,
        });
        debug!(expires_at = ?token_response.expires_at, "Obtained GigaChat access token");
        Ok(value)
    }

    /// Current token, renewed first when it is about to expire
    async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            match token.as_ref() {
                None => {
                    return Err(Error::Authentication(
                        "Not authenticated. Call connect() first.".to_string(),
                    ));
                }
                Some(token) if token.is_fresh(Utc::now().timestamp_millis()) => {
                    return Ok(token.value.clone());
                }
                Some(_) => {}
            }
        }
        debug!("GigaChat access token is about to expire, renewing");
        self.authenticate().await
    }

    async fn post_embeddings(&self, access_token: &str, texts: &[String]) -> Result<Response> {
        let url = format!("{}/embeddings", self.config.api_url);
        debug!(url = %url, inputs = texts.len(), "Requesting embeddings");

        self.client
            .post(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .json(&EmbeddingRequest {
                model: &self.config.model,
                input: texts,
            })
            .send()
            .await
            .map_err(map_transport_error)
    }
}

#[async_trait]
impl EmbeddingProvider for GigaChatEmbeddings {
    async fn connect(&mut self) -> Result<()> {
        self.authenticate().await?;
        Ok(())
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let access_token = self.access_token().await?;
        let mut response = self.post_embeddings(&access_token, texts).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("GigaChat rejected the access token, authenticating again");
            let access_token = self.authenticate().await?;
            response = self.post_embeddings(&access_token, texts).await?;
        }

        let response: EmbeddingResponse = decode_json(response, "GigaChat embeddings").await?;
        ordered_vectors(response.data, texts.len())
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_mean_pool() {
        let pooled = mean_pool(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(pooled, vec![2.0, 3.0]);
        assert!(mean_pool(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn test_openai_embeddings_restore_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                    {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
                ],
                "model": "text-embedding-3-small"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = EmbeddingConfig::new(ProviderKind::OpenAi)
            .with_api_url(server.uri())
            .with_api_key("sk-test");
        let client = OpenAiEmbeddings::new(config).unwrap();

        let vectors = client
            .embed_documents(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_openai_empty_batch_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let config = EmbeddingConfig::new(ProviderKind::OpenAi).with_api_url(server.uri());
        let client = OpenAiEmbeddings::new(config).unwrap();
        assert!(client.embed_documents(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_openai_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let config = EmbeddingConfig::new(ProviderKind::OpenAi).with_api_url(server.uri());
        let client = OpenAiEmbeddings::new(config).unwrap();

        let err = client.embed_query("hello").await.unwrap_err();
        match err {
            Error::Embedding(message) => {
                assert!(message.contains("401"));
                assert!(message.contains("invalid api key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_huggingface_token_level_output_is_pooled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pipeline/feature-extraction/cointegrated/rubert-tiny2"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                [[1.0, 1.0], [3.0, 5.0]]
            ])))
            .mount(&server)
            .await;

        let config = EmbeddingConfig::new(ProviderKind::HuggingFace)
            .with_api_url(server.uri())
            .with_api_key("hf_test");
        let client = HuggingFaceEmbeddings::new(config).unwrap();

        let vector = client.embed_query("привет").await.unwrap();
        assert_eq!(vector, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_huggingface_pooled_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pipeline/feature-extraction/cointegrated/rubert-tiny2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                [0.5, 0.5, 0.0],
                [0.0, 0.5, 0.5]
            ])))
            .mount(&server)
            .await;

        let config = EmbeddingConfig::new(ProviderKind::HuggingFace)
            .with_api_url(server.uri())
            .with_api_key("hf_test");
        let client = HuggingFaceEmbeddings::new(config).unwrap();

        let vectors = client
            .embed_documents(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_huggingface_requires_token() {
        let config = EmbeddingConfig::new(ProviderKind::HuggingFace);
        assert!(matches!(
            HuggingFaceEmbeddings::new(config),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_gigachat_requires_connect() {
        let config = EmbeddingConfig::new(ProviderKind::GigaChat).with_api_key("key");
        let client = GigaChatEmbeddings::new(config).unwrap();
        let err = client.embed_query("текст").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_gigachat_token_exchange_and_embeddings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth"))
            .and(header("authorization", "Basic auth-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-123",
                "expires_at": 4_102_444_800_000_i64
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/embeddings"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
                "model": "Embeddings"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = EmbeddingConfig::new(ProviderKind::GigaChat)
            .with_api_url(format!("{}/api/v1", server.uri()))
            .with_api_key("auth-key");
        config.oauth_url = format!("{}/api/v2/oauth", server.uri());

        let mut client = GigaChatEmbeddings::new(config).unwrap();
        client.connect().await.unwrap();
        assert!(client.is_authenticated().await);

        let vector = client.embed_query("данные").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_gigachat_rejected_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut config = EmbeddingConfig::new(ProviderKind::GigaChat).with_api_key("bad");
        config.oauth_url = format!("{}/oauth", server.uri());

        let mut client = GigaChatEmbeddings::new(config).unwrap();
        assert!(matches!(client.connect().await, Err(Error::Authentication(_))));
    }

    fn gigachat_config(server: &MockServer) -> EmbeddingConfig {
        let mut config = EmbeddingConfig::new(ProviderKind::GigaChat)
            .with_api_url(format!("{}/api/v1", server.uri()))
            .with_api_key("auth-key");
        config.oauth_url = format!("{}/api/v2/oauth", server.uri());
        config
    }

    fn embeddings_body() -> serde_json::Value {
        json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.5, 0.5]}],
            "model": "Embeddings"
        })
    }

    #[tokio::test]
    async fn test_gigachat_reauthenticates_after_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-123",
                "expires_at": 4_102_444_800_000_i64
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embeddings_body()))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = GigaChatEmbeddings::new(gigachat_config(&server)).unwrap();
        client.connect().await.unwrap();

        let vector = client.embed_query("метаданные").await.unwrap();
        assert_eq!(vector, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_gigachat_renews_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "short-lived",
                "expires_at": 1_000_i64
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/embeddings"))
            .and(header("authorization", "Bearer short-lived"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embeddings_body()))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = GigaChatEmbeddings::new(gigachat_config(&server)).unwrap();
        client.connect().await.unwrap();
        client.embed_query("качество").await.unwrap();
    }

    #[test]
    fn test_token_freshness() {
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: Some(1_000_000),
        };
        assert!(token.is_fresh(1_000_000 - TOKEN_REFRESH_MARGIN_MS - 1));
        assert!(!token.is_fresh(1_000_000 - TOKEN_REFRESH_MARGIN_MS));
        let open_ended = AccessToken {
            value: "t".to_string(),
            expires_at: None,
        };
        assert!(open_ended.is_fresh(i64::MAX - TOKEN_REFRESH_MARGIN_MS));
    }
}
