use std::sync::Arc;

use tracing::{debug, info};

use funnelsight_core::config::WorkflowConfig;
use funnelsight_core::domain::analysis::{QueryOutcome, Synthesis, TechnicalResult};
use funnelsight_core::domain::conversation::ConversationTurn;
use funnelsight_core::verbosity::detect_verbosity;

use super::StageError;
use crate::conversation::chat_window;
use crate::llm::{ChatMessage, LlmClient, LlmRequest};
use crate::prompts::{synthesis_request, technical_summary, BUSINESS_ANALYST_PROMPT};

/// Business analyst answer built from the technical result.
pub struct SynthesisStage {
    llm: Arc<dyn LlmClient>,
    history_window: usize,
    truncate_chars: usize,
    verbosity_window: usize,
    temperature: f32,
}

impl SynthesisStage {
    pub fn new(llm: Arc<dyn LlmClient>, workflow: &WorkflowConfig, temperature: f32) -> Self {
        Self {
            llm,
            history_window: workflow.synthesis_history_window,
            truncate_chars: workflow.synthesis_truncate_chars,
            verbosity_window: workflow.verbosity_history_window,
            temperature,
        }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        result: &TechnicalResult,
        history: &[ConversationTurn],
    ) -> Result<Synthesis, StageError> {
        let verbosity = detect_verbosity(question, history, self.verbosity_window);

        if !result.data_available() {
            info!(
                event_name = "stage.synthesis.no_data",
                outcome = outcome_label(&result.outcome()),
                "answering without figures"
            );
            return Ok(Synthesis {
                text: no_data_response(result),
                verbosity,
                data_available: false,
            });
        }

        let mut messages = chat_window(history, self.history_window, self.truncate_chars);
        messages.push(ChatMessage::user(synthesis_request(question, result, verbosity)));
        let reply = self
            .llm
            .invoke(
                LlmRequest::new(BUSINESS_ANALYST_PROMPT, self.temperature).with_messages(messages),
            )
            .await?;

        let mut text = reply.text.trim().to_string();
        if text.is_empty() {
            text = result.analysis_text.trim().to_string();
        }
        if text.is_empty() {
            text = technical_summary(result);
        }
        debug!(
            event_name = "stage.synthesis.completed",
            verbosity = ?verbosity,
            chars = text.len(),
            "answer synthesized"
        );
        Ok(Synthesis { text, verbosity, data_available: true })
    }
}

/// Deterministic answer for results without rows. Only an executed query that
/// came back empty is reported as "no data available".
pub fn no_data_response(result: &TechnicalResult) -> String {
    let criteria = match result.parameters.describe() {
        described if described.is_empty() => "the requested criteria".to_string(),
        described => format!("the requested criteria ({described})"),
    };
    match result.outcome() {
        QueryOutcome::Failed { reason } => format!(
            "I could not retrieve data for {criteria}: the query failed ({reason}). \
             No figures are reported."
        ),
        QueryOutcome::NotExecuted => format!(
            "I could not run a query for {criteria}, so no figures are reported."
        ),
        QueryOutcome::Empty | QueryOutcome::Rows { .. } => format!(
            "No data available for {criteria}. The warehouse query ran but returned no rows, \
             so no figures can be reported."
        ),
    }
}

fn outcome_label(outcome: &QueryOutcome) -> &'static str {
    match outcome {
        QueryOutcome::Rows { .. } => "rows",
        QueryOutcome::Empty => "empty",
        QueryOutcome::Failed { .. } => "failed",
        QueryOutcome::NotExecuted => "not_executed",
    }
}
