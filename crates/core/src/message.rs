//! Conversation and prompt domain types.
//!
//! These are the value objects that flow through a single request:
//! caller history arrives as [`ConversationTurn`]s → the prompt assembler
//! turns them into [`PromptMessage`]s → the provider generates a reply.

use serde::{Deserialize, Serialize};

/// Who authored a turn in caller-supplied history.
///
/// The wire format uses `"user"` and `"bot"`. Anything else is accepted
/// and mapped to [`Sender::Unknown`] so a single odd entry never fails the
/// whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    #[serde(other)]
    Unknown,
}

/// One prior turn of the conversation, exactly as the caller sent it.
///
/// History is owned by the caller; the service never persists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(default)]
    pub sender: Option<Sender>,

    #[serde(default)]
    pub text: Option<String>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Some(Sender::User),
            text: Some(text.into()),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Some(Sender::Bot),
            text: Some(text.into()),
        }
    }

    /// Map this turn onto a prompt message.
    ///
    /// Returns `None` for turns with an unknown or missing sender and for
    /// turns whose text is missing or empty.
    pub fn to_prompt_message(&self) -> Option<PromptMessage> {
        let text = self.text.as_deref().filter(|t| !t.is_empty())?;
        match self.sender? {
            Sender::User => Some(PromptMessage::User(text.to_string())),
            Sender::Bot => Some(PromptMessage::Assistant(text.to_string())),
            Sender::Unknown => None,
        }
    }
}

/// The role of a prompt message as understood by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed behavioral directive
    System,
    /// The end user
    User,
    /// The model's earlier replies
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in the final prompt sent to the generator.
///
/// Built fresh for every request and never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum PromptMessage {
    System(String),
    User(String),
    Assistant(String),
}

impl PromptMessage {
    pub fn role(&self) -> Role {
        match self {
            Self::System(_) => Role::System,
            Self::User(_) => Role::User,
            Self::Assistant(_) => Role::Assistant,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System(text) | Self::User(text) | Self::Assistant(text) => text,
        }
    }
}
