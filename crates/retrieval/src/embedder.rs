//! Thin wrapper pairing a provider with the embedding model to call.

use std::sync::Arc;

use medchat_core::error::ProviderError;
use medchat_core::provider::{EmbeddingRequest, Provider};

/// Embeds text through a [`Provider`] with a fixed model.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a batch of texts, one vector per input, in input order.
    pub async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ProviderError> {
        let expected = inputs.len();
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await?;

        if response.embeddings.len() != expected {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: format!(
                    "Expected {expected} embeddings, got {}",
                    response.embeddings.len()
                ),
            });
        }

        Ok(response.embeddings)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, input: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed(vec![input.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "Empty embedding response".into(),
        })
    }
}
