//! Request-level streaming events.
//!
//! `StreamEvent` is what the controller emits and the gateway forwards to
//! clients over SSE. Every request produces `Data* Error? Done`.

use serde::{Deserialize, Serialize};

/// The only error text a client ever sees.
pub const ERROR_MESSAGE: &str = "Sorry, an error occurred while processing your request.";

/// Payload of the terminal `done` event.
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// One non-empty generated fragment.
    Data(String),

    /// Generic failure notice; detail stays in the logs.
    Error(String),

    /// End of stream.
    Done,
}

impl StreamEvent {
    pub fn error() -> Self {
        Self::Error(ERROR_MESSAGE.to_string())
    }

    /// SSE event name, or `None` for unnamed data events.
    pub fn event_type(&self) -> Option<&'static str> {
        match self {
            Self::Data(_) => None,
            Self::Error(_) => Some("error"),
            Self::Done => Some("done"),
        }
    }

    /// SSE data payload.
    pub fn payload(&self) -> &str {
        match self {
            Self::Data(text) | Self::Error(text) => text,
            Self::Done => DONE_MARKER,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}
