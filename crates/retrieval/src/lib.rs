//! # medchat Retrieval
//!
//! Passage retrieval for the chat pipeline:
//!
//! - [`VectorIndex`]: flat, JSON-persisted index of embedded passages
//! - [`EmbeddingRetriever`]: the [`Retriever`](medchat_core::Retriever)
//!   implementation used at request time
//! - [`ingest`]: turns a doctor/patient dialogue dataset into an index
//!
//! The index is built once, offline or at first start, and is read-only
//! while serving.

pub mod embedder;
pub mod index;
pub mod ingest;
pub mod retriever;
pub mod vector;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use embedder::Embedder;
pub use index::{IndexError, IndexManifest, IndexedPassage, VectorIndex};
pub use ingest::{IngestError, IngestOptions, IngestReport, build_index, open_or_build};
pub use retriever::EmbeddingRetriever;
