//! Embedding-backed retriever over a [`VectorIndex`].

use std::sync::Arc;

use async_trait::async_trait;
use medchat_core::error::RetrievalError;
use medchat_core::retriever::{RetrievedPassage, Retriever};
use tracing::debug;

use crate::embedder::Embedder;
use crate::index::VectorIndex;

/// Embeds the query, then returns the `top_k` nearest indexed passages.
pub struct EmbeddingRetriever {
    index: Arc<VectorIndex>,
    embedder: Embedder,
    top_k: usize,
}

impl EmbeddingRetriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Embedder, top_k: usize) -> Self {
        Self {
            index,
            embedder,
            top_k,
        }
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    fn name(&self) -> &str {
        "vector_index"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        // Nothing can match, so skip the embedding call.
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed_one(query)
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        let passages = self.index.search(&query_embedding, self.top_k)?;
        debug!(
            top_k = self.top_k,
            returned = passages.len(),
            "Retrieved passages"
        );
        Ok(passages)
    }
}
