//! Validation of incoming chat requests.

use medchat_core::message::ConversationTurn;
use serde_json::Value;

/// Why a request was rejected before any work started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Request body must be JSON")]
    NotJson,

    #[error("Query parameter missing")]
    MissingQuery,
}

/// A validated chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Raw query text; guaranteed non-blank, never trimmed.
    pub query: String,
    /// Caller history exactly as supplied, in order.
    pub history: Vec<ConversationTurn>,
}

impl StreamRequest {
    pub fn new(query: impl Into<String>, history: Vec<ConversationTurn>) -> Result<Self, RequestError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(RequestError::MissingQuery);
        }
        Ok(Self { query, history })
    }

    /// Validate a decoded JSON body.
    ///
    /// The body must be a non-empty object. `query` must be a non-blank string.
    /// `history` may be absent or null; when present it must be an array.
    /// Malformed history entries are kept as empty turns so the prompt
    /// assembler drops them.
    pub fn from_json(body: &Value) -> Result<Self, RequestError> {
        let Some(object) = body.as_object().filter(|o| !o.is_empty()) else {
            return Err(RequestError::NotJson);
        };

        let query = match object.get("query") {
            None | Some(Value::Null) => return Err(RequestError::MissingQuery),
            Some(Value::String(q)) => q.clone(),
            Some(_) => return Err(RequestError::NotJson),
        };

        let history = match object.get("history") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries.iter().map(parse_turn).collect(),
            Some(_) => return Err(RequestError::NotJson),
        };

        Self::new(query, history)
    }

    /// Whether the caller supplied no history at all.
    pub fn is_first_turn(&self) -> bool {
        self.history.is_empty()
    }
}

fn parse_turn(entry: &Value) -> ConversationTurn {
    serde_json::from_value(entry.clone()).unwrap_or(ConversationTurn {
        sender: None,
        text: None,
    })
}
