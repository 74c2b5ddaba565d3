//! # medchat Core
//!
//! Domain types, traits, and error definitions for the medchat
//! retrieval-augmented chat service. This crate has **no transport or
//! storage dependencies**: it defines the request-time domain model that
//! the pipeline consumes and the provider/retrieval crates implement.
//!
//! ## Design Philosophy
//!
//! Both external collaborators are traits here:
//! - [`Provider`] produces a one-shot stream of generated text fragments
//! - [`Retriever`] returns the passages most relevant to a query
//!
//! The stream controller only ever sees these traits, so it can be driven
//! by deterministic fakes in tests and by real backends in production.

pub mod error;
pub mod message;
pub mod provider;
pub mod retriever;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, RetrievalError};
pub use message::{ConversationTurn, PromptMessage, Role, Sender};
pub use provider::{FragmentStream, Provider, ProviderRequest, StreamChunk};
pub use retriever::{RetrievedPassage, Retriever};
