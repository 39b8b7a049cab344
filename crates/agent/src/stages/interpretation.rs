use std::sync::Arc;

use tracing::debug;

use funnelsight_core::clarification::{ClarificationDecision, ClarificationPolicy};
use funnelsight_core::config::WorkflowConfig;
use funnelsight_core::domain::analysis::Interpretation;
use funnelsight_core::domain::conversation::ConversationTurn;

use super::StageError;
use crate::conversation::chat_window;
use crate::llm::{ChatMessage, LlmClient, LlmRequest};
use crate::prompts::{interpretation_request, BUSINESS_ANALYST_PROMPT};

/// Business analyst reading of the question plus the clarification decision.
pub struct InterpretationStage {
    llm: Arc<dyn LlmClient>,
    policy: ClarificationPolicy,
    history_window: usize,
    truncate_chars: usize,
    temperature: f32,
}

impl InterpretationStage {
    pub fn new(llm: Arc<dyn LlmClient>, workflow: &WorkflowConfig, temperature: f32) -> Self {
        Self {
            llm,
            policy: ClarificationPolicy::new(workflow.max_clarifying_questions),
            history_window: workflow.interpretation_history_window,
            truncate_chars: workflow.interpretation_truncate_chars,
            temperature,
        }
    }

    /// Pure: no reasoning call is made.
    pub fn assess(&self, question: &str, history: &[ConversationTurn]) -> ClarificationDecision {
        self.policy.decide(question, history)
    }

    pub async fn interpret(
        &self,
        question: &str,
        history: &[ConversationTurn],
        assumptions: &[String],
    ) -> Result<Interpretation, StageError> {
        let mut messages = chat_window(history, self.history_window, self.truncate_chars);
        messages.push(ChatMessage::user(interpretation_request(question, assumptions)));

        let reply = self
            .llm
            .invoke(
                LlmRequest::new(BUSINESS_ANALYST_PROMPT, self.temperature).with_messages(messages),
            )
            .await?;

        let text = reply.text.trim();
        debug!(
            event_name = "stage.interpretation.completed",
            chars = text.len(),
            assumptions = assumptions.len(),
            "question interpreted"
        );
        // A blank reading still lets analysis proceed from the raw question.
        let text = if text.is_empty() { question.trim().to_string() } else { text.to_string() };
        Ok(Interpretation { text, assumptions: assumptions.to_vec() })
    }
}
