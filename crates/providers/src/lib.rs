//! LLM provider implementations for medchat.
//!
//! All providers implement the `medchat_core::Provider` trait.
//! The router selects the configured provider by name.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
