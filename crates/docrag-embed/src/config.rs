//! Embedding provider configuration

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

use docrag_core::{Error, Result};

/// Embedding backends supported out of the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible `/v1/embeddings` endpoint (OpenAI, LM Studio, Ollama, vLLM)
    OpenAi,
    /// HuggingFace inference API, feature-extraction pipeline
    HuggingFace,
    /// Sber GigaChat embeddings API
    GigaChat,
    /// Offline feature hashing, no network access
    Hash,
}

impl ProviderKind {
    /// Model used when `EMBEDDING_MODEL` is unset
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "text-embedding-3-small",
            ProviderKind::HuggingFace => "cointegrated/rubert-tiny2",
            ProviderKind::GigaChat => "Embeddings",
            ProviderKind::Hash => "feature-hash",
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::HuggingFace => "https://api-inference.huggingface.co",
            ProviderKind::GigaChat => "https://gigachat.devices.sberbank.ru/api/v1",
            ProviderKind::Hash => "",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "openai-compatible" | "lmstudio" | "ollama" => Ok(ProviderKind::OpenAi),
            "huggingface" | "hf" => Ok(ProviderKind::HuggingFace),
            "gigachat" => Ok(ProviderKind::GigaChat),
            "hash" | "local" => Ok(ProviderKind::Hash),
            other => Err(Error::Configuration(format!(
                "Unknown embedding provider '{}' (expected openai, huggingface, gigachat or hash)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::GigaChat => "gigachat",
            ProviderKind::Hash => "hash",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for an embedding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_url: String,
    pub api_key: Option<String>,
    /// GigaChat token endpoint
    pub oauth_url: String,
    /// GigaChat API scope
    pub scope: String,
    /// Vector length for the hash provider
    pub dimensions: usize,
    pub timeout_secs: u64,
}

const GIGACHAT_OAUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
const GIGACHAT_SCOPE: &str = "GIGACHAT_API_PERS";

impl EmbeddingConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider = match env::var("EMBEDDING_PROVIDER") {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().parse()?,
            _ => ProviderKind::Hash,
        };

        let mut config = Self::new(provider);

        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            config.model = model;
        }
        if let Ok(url) = env::var("EMBEDDING_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        config.api_key = match provider {
            ProviderKind::OpenAi => env::var("EMBEDDING_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .ok(),
            ProviderKind::HuggingFace => Some(
                env::var("HF_TOKEN")
                    .or_else(|_| env::var("EMBEDDING_API_KEY"))
                    .map_err(|_| {
                        Error::Configuration(
                            "HF_TOKEN environment variable not found".to_string(),
                        )
                    })?,
            ),
            ProviderKind::GigaChat => Some(
                env::var("GIGACHAT_TOKEN")
                    .ok()
                    .or_else(|| {
                        let id = env::var("GIGACHAT_CLIENT_ID").ok()?;
                        let secret = env::var("GIGACHAT_CLIENT_SECRET").ok()?;
                        Some(authorization_key(&id, &secret))
                    })
                    .ok_or_else(|| {
                        Error::Configuration(
                            "GIGACHAT_TOKEN or GIGACHAT_CLIENT_ID/GIGACHAT_CLIENT_SECRET not found"
                                .to_string(),
                        )
                    })?,
            ),
            ProviderKind::Hash => None,
        };

        if let Ok(url) = env::var("GIGACHAT_OAUTH_URL") {
            config.oauth_url = url;
        }
        if let Ok(scope) = env::var("GIGACHAT_SCOPE") {
            config.scope = scope;
        }
        if let Ok(raw) = env::var("EMBEDDING_DIMENSIONS") {
            config.dimensions = raw.trim().parse().map_err(|_| {
                Error::Configuration(format!("EMBEDDING_DIMENSIONS has invalid value '{}'", raw))
            })?;
        }
        if let Ok(raw) = env::var("EMBEDDING_TIMEOUT_SECS") {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                Error::Configuration(format!("EMBEDDING_TIMEOUT_SECS has invalid value '{}'", raw))
            })?;
        }

        Ok(config)
    }

    /// Create configuration with provider defaults
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_url: provider.default_api_url().to_string(),
            api_key: None,
            oauth_url: GIGACHAT_OAUTH_URL.to_string(),
            scope: GIGACHAT_SCOPE.to_string(),
            dimensions: 384,
            timeout_secs: 60,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// GigaChat authorization key: base64 of `client_id:client_secret`
pub fn authorization_key(client_id: &str, client_secret: &str) -> String {
    STANDARD.encode(format!("{}:{}", client_id, client_secret))
}
