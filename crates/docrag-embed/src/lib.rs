//! Embedding providers for docrag
//!
//! This crate provides implementations of the EmbeddingProvider trait for hosted
//! APIs (OpenAI-compatible, HuggingFace, GigaChat) and an offline hashing fallback.

mod client;
mod config;
mod hash;


pub use client::{GigaChatEmbeddings, HuggingFaceEmbeddings, OpenAiEmbeddings};
pub use config::{authorization_key, EmbeddingConfig, ProviderKind};
pub use hash::HashEmbeddings;

// Re-export core types for convenience
pub use docrag_core::{EmbeddingProvider, Error, Result};

/// Build the provider described by `config`.
///
/// The returned provider still needs [`EmbeddingProvider::connect`] before use.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => Box::new(OpenAiEmbeddings::new(config.clone())?),
        ProviderKind::HuggingFace => Box::new(HuggingFaceEmbeddings::new(config.clone())?),
        ProviderKind::GigaChat => Box::new(GigaChatEmbeddings::new(config.clone())?),
        ProviderKind::Hash => Box::new(HashEmbeddings::new(config.dimensions)?),
    };
    Ok(provider)
}
