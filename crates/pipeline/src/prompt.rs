//! Prompt assembly.
//!
//! Every prompt has the same shape:
//!
//! 1. the system directive
//! 2. the caller's history, in order, minus unusable turns
//! 3. one user message wrapping the retrieved context and the raw query
//!
//! Assembly is pure: identical inputs always produce identical prompts.

use medchat_core::message::{ConversationTurn, PromptMessage};
use medchat_core::retriever::RetrievedPassage;

use crate::directive::SystemDirective;

/// Joins passage texts inside the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Context block content when retrieval found nothing.
pub const NO_CONTEXT: &str = "None retrieved.";

/// Render the final user message for this turn.
pub fn render_turn(context: &str, user_query: &str) -> String {
    format!(
        "(Background Context - Informational Only - Follow Rule #7 Strictly:\n\
         ```\n{context}\n```)\n\n\
         User's latest message: \"{user_query}\""
    )
}

/// Join passage texts into a context block.
pub fn context_block(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return NO_CONTEXT.to_string();
    }
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Builds the ordered message list handed to the generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler {
    directive: SystemDirective,
}

impl PromptAssembler {
    pub fn new(directive: SystemDirective) -> Self {
        Self { directive }
    }

    pub fn assemble(
        &self,
        history: &[ConversationTurn],
        query: &str,
        passages: &[RetrievedPassage],
    ) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::System(self.directive.text.to_string()));
        messages.extend(history.iter().filter_map(ConversationTurn::to_prompt_message));
        messages.push(PromptMessage::User(render_turn(
            &context_block(passages),
            query,
        )));
        messages
    }
}
