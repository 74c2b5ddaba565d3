//! Retriever trait — the abstraction over the passage store.
//!
//! A Retriever answers "which corpus passages are most relevant to this
//! text?" It may be backed by any vector index; the pipeline only relies on
//! the contract documented on [`Retriever::retrieve`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// One passage returned for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// Stable passage identifier within its index
    #[serde(default)]
    pub id: String,

    /// The passage text
    pub text: String,

    /// Source metadata recorded at ingestion time
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub source_metadata: serde_json::Map<String, serde_json::Value>,

    /// Relevance score assigned by the index (higher is more relevant)
    #[serde(default)]
    pub score: f32,
}

impl RetrievedPassage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            source_metadata: serde_json::Map::new(),
            score: 0.0,
        }
    }
}

/// The core Retriever trait.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// A human-readable name for this retriever (e.g., "vector_index").
    fn name(&self) -> &str;

    /// Return up to K passages for `query`, most relevant first.
    ///
    /// An empty vector is a valid answer when nothing matches. Any failure
    /// is an `Err`; implementations never substitute made-up content.
    async fn retrieve(&self, query: &str) -> std::result::Result<Vec<RetrievedPassage>, RetrievalError>;
}
