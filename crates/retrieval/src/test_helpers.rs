//! Shared test helpers for retrieval tests.

use async_trait::async_trait;
use medchat_core::error::ProviderError;
use medchat_core::provider::{
    EmbeddingRequest, EmbeddingResponse, FragmentStream, Provider, ProviderRequest,
};

/// Deterministic embedder: one dimension per ASCII letter, valued by count.
///
/// Texts built from the same letters embed identically, which makes tie
/// behaviour easy to provoke.
pub struct LetterEmbedProvider;

impl LetterEmbedProvider {
    pub const MODEL: &'static str = "letter-embed";

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for b in text.bytes().filter(u8::is_ascii_alphabetic) {
            v[(b.to_ascii_lowercase() - b'a') as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Provider for LetterEmbedProvider {
    fn name(&self) -> &str {
        "letter_embed"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<FragmentStream, ProviderError> {
        Err(ProviderError::NotConfigured("embedding only".into()))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|t| Self::vector(t)).collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// A provider whose embedding endpoint is always down.
pub struct FailingEmbedProvider;

#[async_trait]
impl Provider for FailingEmbedProvider {
    fn name(&self) -> &str {
        "failing_embed"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<FragmentStream, ProviderError> {
        Err(ProviderError::NotConfigured("embedding only".into()))
    }

    async fn embed(&self, _request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}
