//! Flat vector index with JSON persistence.
//!
//! The whole index is one JSON document:
//!
//! ```json
//! { "manifest": { "version": 1, "embedding_model": "...", "built_at": "...", "dimensions": 1024 },
//!   "passages": [ { "id": "...", "text": "...", "metadata": {...}, "embedding": [...] } ] }
//! ```
//!
//! It is built once (see [`crate::ingest`]), then loaded at process start
//! and only read afterwards, so it can be shared behind an `Arc` without
//! locking.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use medchat_core::error::RetrievalError;
use medchat_core::retriever::RetrievedPassage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::vector;

/// On-disk format version.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Describes how an index was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
    /// Embedding width; 0 until the first passage is inserted
    pub dimensions: usize,
}

/// A passage together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPassage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub embedding: Vec<f32>,
}

/// Stable identifier for a passage: hex SHA-256 of its text.
pub fn passage_id(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Failed to access index at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Index at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Index format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Embedding dimension mismatch: index has {expected}, passage has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    manifest: IndexManifest,
    passages: Vec<IndexedPassage>,
}

impl VectorIndex {
    /// Create an empty index for embeddings produced by `embedding_model`.
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            manifest: IndexManifest {
                version: INDEX_FORMAT_VERSION,
                embedding_model: embedding_model.into(),
                built_at: Utc::now(),
                dimensions: 0,
            },
            passages: Vec::new(),
        }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Insert a passage. Returns `Ok(false)` if a passage with the same id
    /// is already present.
    pub fn insert(&mut self, passage: IndexedPassage) -> Result<bool, IndexError> {
        let width = passage.embedding.len();
        if self.manifest.dimensions == 0 {
            self.manifest.dimensions = width;
        } else if width != self.manifest.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: width,
            });
        }

        if self.passages.iter().any(|p| p.id == passage.id) {
            return Ok(false);
        }

        self.passages.push(passage);
        Ok(true)
    }

    /// Return the `limit` passages closest to `query_embedding`.
    pub fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if self.passages.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        if query_embedding.len() != self.manifest.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: query_embedding.len(),
            });
        }

        Ok(vector::rank(&self.passages, query_embedding, limit)
            .into_iter()
            .map(|(score, p)| RetrievedPassage {
                id: p.id.clone(),
                text: p.text.clone(),
                source_metadata: p.metadata.clone(),
                score,
            })
            .collect())
    }

    /// Load an index from disk.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let content = std::fs::read_to_string(path).map_err(|e| IndexError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let index: Self = serde_json::from_str(&content).map_err(|e| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if index.manifest.version != INDEX_FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: index.manifest.version,
                expected: INDEX_FORMAT_VERSION,
            });
        }

        if let Some(bad) = index
            .passages
            .iter()
            .find(|p| p.embedding.len() != index.manifest.dimensions)
        {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "passage {} has {} dimensions, manifest says {}",
                    bad.id,
                    bad.embedding.len(),
                    index.manifest.dimensions
                ),
            });
        }

        debug!(path = %path.display(), passages = index.len(), "Vector index loaded");
        Ok(index)
    }

    /// Write the index to disk, replacing any existing file.
    ///
    /// Writes to a sibling temp file first so readers never observe a
    /// half-written index.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let io_err = |e: std::io::Error| IndexError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = serde_json::to_string(self).map_err(|e| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        debug!(path = %path.display(), passages = self.len(), "Vector index saved");
        Ok(())
    }
}
