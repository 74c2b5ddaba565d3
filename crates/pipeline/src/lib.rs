//! # medchat Pipeline
//!
//! The request-time heart of the service: validate a chat request,
//! retrieve background passages, assemble the prompt, and stream the
//! generated reply as an ordered sequence of [`StreamEvent`]s.
//!
//! The pipeline only sees the [`Retriever`](medchat_core::Retriever) and
//! [`Provider`](medchat_core::Provider) traits; transports live elsewhere.

pub mod controller;
pub mod directive;
pub mod prompt;
pub mod request;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use controller::{
    GenerationSettings, PipelineError, StreamController, StreamOutcome, StreamState,
};
pub use directive::{DIRECTIVE_V1, FIRST_TURN_GREETING, SystemDirective};
pub use prompt::PromptAssembler;
pub use request::{RequestError, StreamRequest};
pub use stream_event::{ERROR_MESSAGE, StreamEvent};
