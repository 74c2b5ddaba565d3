//! The stream controller: one request in, an ordered event stream out.
//!
//! # Flow
//!
//! 1. Retrieve passages for the query
//! 2. Assemble the prompt
//! 3. Stream fragments from the provider, forwarding each as it arrives
//! 4. Finish with `Done`, preceded by a single `Error` if anything failed
//!
//! ```text
//! Idle ──▶ Retrieving ──▶ Generating ──▶ Completed
//!              │              │
//!              └──────┬───────┘
//!                     ▼
//!                  Failed
//! ```

use std::sync::Arc;

use medchat_core::error::{ProviderError, RetrievalError};
use medchat_core::provider::{Provider, ProviderRequest};
use medchat_core::retriever::Retriever;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info};

use crate::prompt::PromptAssembler;
use crate::request::StreamRequest;
use crate::stream_event::StreamEvent;

const EVENT_BUFFER: usize = 64;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Retrieving,
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Generation failed: {0}")]
    Generation(#[from] ProviderError),
}

/// Summary of one finished request, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub state: StreamState,
    /// `Data` events delivered
    pub fragments: usize,
    /// Characters delivered across all fragments
    pub response_len: usize,
    /// The receiver went away before the stream finished
    pub disconnected: bool,
}

impl Default for StreamOutcome {
    fn default() -> Self {
        Self {
            state: StreamState::Idle,
            fragments: 0,
            response_len: 0,
            disconnected: false,
        }
    }
}

/// Model parameters attached to every generation call.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.4,
            max_tokens: None,
        }
    }
}

enum Halt {
    Failed(PipelineError),
    Disconnected,
}

impl From<RetrievalError> for Halt {
    fn from(e: RetrievalError) -> Self {
        Self::Failed(e.into())
    }
}

impl From<ProviderError> for Halt {
    fn from(e: ProviderError) -> Self {
        Self::Failed(e.into())
    }
}

/// Drives requests through retrieval and generation.
///
/// Cheap to clone; collaborators are shared and never mutated.
#[derive(Clone)]
pub struct StreamController {
    retriever: Arc<dyn Retriever>,
    provider: Arc<dyn Provider>,
    assembler: PromptAssembler,
    settings: GenerationSettings,
}

impl StreamController {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        provider: Arc<dyn Provider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            retriever,
            provider,
            assembler: PromptAssembler::default(),
            settings,
        }
    }

    /// Start processing `request` on a background task.
    ///
    /// The returned receiver yields `Data* Error? Done`. Dropping it
    /// abandons the request.
    pub fn run(&self, request: StreamRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let controller = self.clone();

        tokio::spawn(
            async move {
                controller.drive(request, &tx).await;
            }
            .instrument(tracing::Span::current()),
        );

        rx
    }

    /// Process `request` to completion on the current task, sending events
    /// to `tx`.
    pub async fn drive(
        &self,
        request: StreamRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> StreamOutcome {
        info!(
            query_len = request.query.chars().count(),
            history_len = request.history.len(),
            first_turn = request.is_first_turn(),
            "Stream request received"
        );

        let mut outcome = StreamOutcome::default();

        match self.generate(&request, tx, &mut outcome).await {
            Ok(()) => {
                outcome.state = StreamState::Completed;
                let _ = tx.send(StreamEvent::Done).await;
            }
            Err(Halt::Failed(e)) => {
                error!(state = ?outcome.state, error = %e, "Stream failed");
                outcome.state = StreamState::Failed;
                if tx.send(StreamEvent::error()).await.is_ok() {
                    let _ = tx.send(StreamEvent::Done).await;
                }
            }
            Err(Halt::Disconnected) => {
                debug!(state = ?outcome.state, "Client disconnected, abandoning generation");
                outcome.disconnected = true;
            }
        }

        info!(
            state = ?outcome.state,
            fragments = outcome.fragments,
            response_len = outcome.response_len,
            disconnected = outcome.disconnected,
            "Stream finished"
        );
        outcome
    }

    async fn generate(
        &self,
        request: &StreamRequest,
        tx: &mpsc::Sender<StreamEvent>,
        outcome: &mut StreamOutcome,
    ) -> Result<(), Halt> {
        outcome.state = StreamState::Retrieving;
        let passages = self.retriever.retrieve(&request.query).await?;
        debug!(
            retriever = self.retriever.name(),
            passages = passages.len(),
            "Context retrieved"
        );

        let messages = self
            .assembler
            .assemble(&request.history, &request.query, &passages);

        outcome.state = StreamState::Generating;
        debug!(
            provider = self.provider.name(),
            model = %self.settings.model,
            messages = messages.len(),
            "Streaming from provider"
        );

        let mut fragments = self
            .provider
            .stream(ProviderRequest {
                model: self.settings.model.clone(),
                messages,
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                stream: true,
                stop: vec![],
            })
            .await?;

        while let Some(item) = fragments.recv().await {
            let chunk = item?;

            if let Some(text) = chunk.content
                && !text.is_empty()
            {
                let len = text.chars().count();
                tx.send(StreamEvent::Data(text))
                    .await
                    .map_err(|_| Halt::Disconnected)?;
                outcome.fragments += 1;
                outcome.response_len += len;
            }

            if chunk.done {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use medchat_core::message::{ConversationTurn, PromptMessage, Role};

    use super::*;
    use crate::directive::{DIRECTIVE_V1, FIRST_TURN_GREETING};
    use crate::stream_event::ERROR_MESSAGE;
    use crate::test_helpers::{Ending, ScriptedProvider, ScriptedRetriever};

    fn controller(
        retriever: Arc<ScriptedRetriever>,
        provider: Arc<ScriptedProvider>,
    ) -> StreamController {
        StreamController::new(retriever, provider, GenerationSettings::new("llama3"))
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn data(text: &str) -> StreamEvent {
        StreamEvent::Data(text.into())
    }

    #[tokio::test]
    async fn first_turn_streams_greeting_then_done() {
        let retriever = Arc::new(ScriptedRetriever::empty());
        let provider = Arc::new(ScriptedProvider::clean(&[FIRST_TURN_GREETING]));
        let request = StreamRequest::new("I have a rash on my arm", vec![]).unwrap();

        let events = collect(controller(retriever.clone(), provider.clone()).run(request)).await;
        assert_eq!(events, [data(FIRST_TURN_GREETING), StreamEvent::Done]);

        let sent = provider.captured().unwrap();
        assert_eq!(sent.model, "llama3");
        assert!(sent.stream);
        assert!((sent.temperature - 0.4).abs() < f32::EPSILON);
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0], PromptMessage::System(DIRECTIVE_V1.text.into()));
        assert!(sent.messages[1].content().contains("```\nNone retrieved.\n```"));
        assert_eq!(retriever.queries(), ["I have a rash on my arm"]);
    }

    #[tokio::test]
    async fn follow_up_turn_uses_history_and_context() {
        let retriever = Arc::new(ScriptedRetriever::passages(&[
            "Keep the area clean.",
            "Avoid scratching.",
        ]));
        let provider = Arc::new(ScriptedProvider::clean(&["How long", " has it", " itched?"]));
        let history = vec![
            ConversationTurn::user("I have a rash on my arm"),
            ConversationTurn::bot(FIRST_TURN_GREETING),
        ];
        let request = StreamRequest::new("It is itchy", history).unwrap();

        let events = collect(controller(retriever, provider.clone()).run(request)).await;
        assert_eq!(
            events,
            [
                data("How long"),
                data(" has it"),
                data(" itched?"),
                StreamEvent::Done
            ]
        );

        let sent = provider.captured().unwrap();
        let roles: Vec<Role> = sent.messages.iter().map(PromptMessage::role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert!(
            sent.messages[3]
                .content()
                .contains("Keep the area clean.\n\n---\n\nAvoid scratching.")
        );
    }

    #[tokio::test]
    async fn retrieval_failure_emits_error_then_done() {
        let retriever = Arc::new(ScriptedRetriever::failing());
        let provider = Arc::new(ScriptedProvider::clean(&["never"]));
        let request = StreamRequest::new("q", vec![]).unwrap();

        let events = collect(controller(retriever, provider.clone()).run(request)).await;
        assert_eq!(events, [StreamEvent::error(), StreamEvent::Done]);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn provider_start_failure_emits_error_then_done() {
        let retriever = Arc::new(ScriptedRetriever::empty());
        let provider = Arc::new(ScriptedProvider::new(&[], Ending::FailToStart));
        let request = StreamRequest::new("q", vec![]).unwrap();

        let events = collect(controller(retriever, provider).run(request)).await;
        assert_eq!(events, [StreamEvent::error(), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_delivered_fragments() {
        let retriever = Arc::new(ScriptedRetriever::empty());
        let provider = Arc::new(ScriptedProvider::new(&["Some", " rashes"], Ending::FailMidStream));
        let request = StreamRequest::new("q", vec![]).unwrap();

        let events = collect(controller(retriever, provider).run(request)).await;
        assert_eq!(
            events,
            [
                data("Some"),
                data(" rashes"),
                StreamEvent::Error(ERROR_MESSAGE.into()),
                StreamEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn empty_fragments_are_not_emitted() {
        let retriever = Arc::new(ScriptedRetriever::empty());
        let provider = Arc::new(ScriptedProvider::clean(&["", "a", "", "b"]));
        let request = StreamRequest::new("q", vec![]).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let outcome = controller(retriever, provider).drive(request, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(events, [data("a"), data("b"), StreamEvent::Done]);
        assert_eq!(outcome.state, StreamState::Completed);
        assert_eq!(outcome.fragments, 2);
        assert_eq!(outcome.response_len, 2);
    }

    #[tokio::test]
    async fn failed_outcome_is_reported() {
        let retriever = Arc::new(ScriptedRetriever::failing());
        let provider = Arc::new(ScriptedProvider::clean(&[]));
        let (tx, _rx) = mpsc::channel(16);

        let outcome = controller(retriever, provider)
            .drive(StreamRequest::new("q", vec![]).unwrap(), &tx)
            .await;
        assert_eq!(outcome.state, StreamState::Failed);
        assert!(!outcome.disconnected);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_generation() {
        let retriever = Arc::new(ScriptedRetriever::empty());
        let provider = Arc::new(ScriptedProvider::clean(&["a", "b", "c"]));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = controller(retriever, provider)
            .drive(StreamRequest::new("q", vec![]).unwrap(), &tx)
            .await;
        assert!(outcome.disconnected);
        assert_eq!(outcome.state, StreamState::Generating);
        assert_eq!(outcome.fragments, 0);
    }

    #[tokio::test]
    async fn every_stream_ends_with_exactly_one_done() {
        let scenarios = [
            ScriptedProvider::clean(&["x", "y"]),
            ScriptedProvider::new(&["x"], Ending::FailMidStream),
            ScriptedProvider::new(&[], Ending::FailToStart),
            ScriptedProvider::clean(&[]),
        ];

        for provider in scenarios {
            let c = controller(Arc::new(ScriptedRetriever::empty()), Arc::new(provider));
            let events = collect(c.run(StreamRequest::new("q", vec![]).unwrap())).await;

            assert_eq!(events.last(), Some(&StreamEvent::Done));
            assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
            let errors = events
                .iter()
                .filter(|e| matches!(e, StreamEvent::Error(_)))
                .count();
            assert!(errors <= 1);
            if errors == 1 {
                assert!(matches!(events[events.len() - 2], StreamEvent::Error(_)));
            }
        }
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let c = controller(
            Arc::new(ScriptedRetriever::empty()),
            Arc::new(ScriptedProvider::clean(&["one", "two"])),
        );

        let a = c.run(StreamRequest::new("first", vec![]).unwrap());
        let b = c.run(StreamRequest::new("second", vec![]).unwrap());
        let (a, b) = tokio::join!(collect(a), collect(b));
        assert_eq!(a, b);
        assert_eq!(a, [data("one"), data("two"), StreamEvent::Done]);
    }
}
