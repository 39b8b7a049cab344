use serde::{Deserialize, Serialize};

use crate::domain::analysis::{ExtractedParameters, Interpretation, Synthesis, TechnicalResult};
use crate::domain::conversation::ConversationTurn;
use crate::errors::DomainError;

/// Per-run record that every stage reads and extends. Each stage output is
/// written exactly once; a second write is an invariant violation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    question: String,
    history: Vec<ConversationTurn>,
    interpretation: Option<Interpretation>,
    clarifying_questions: Option<Vec<String>>,
    extracted_parameters: Option<ExtractedParameters>,
    technical_result: Option<TechnicalResult>,
    synthesis: Option<Synthesis>,
    error_message: Option<String>,
    final_response: Option<String>,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        Self {
            question: question.into(),
            history,
            interpretation: None,
            clarifying_questions: None,
            extracted_parameters: None,
            technical_result: None,
            synthesis: None,
            error_message: None,
            final_response: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn interpretation(&self) -> Option<&Interpretation> {
        self.interpretation.as_ref()
    }

    pub fn clarifying_questions(&self) -> &[String] {
        self.clarifying_questions.as_deref().unwrap_or_default()
    }

    pub fn needs_clarification(&self) -> bool {
        !self.clarifying_questions().is_empty()
    }

    pub fn extracted_parameters(&self) -> Option<&ExtractedParameters> {
        self.extracted_parameters.as_ref()
    }

    pub fn technical_result(&self) -> Option<&TechnicalResult> {
        self.technical_result.as_ref()
    }

    pub fn synthesis(&self) -> Option<&Synthesis> {
        self.synthesis.as_ref()
    }

    pub fn error_occurred(&self) -> bool {
        self.error_message.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }

    pub fn set_interpretation(&mut self, value: Interpretation) -> Result<(), DomainError> {
        set_once(&mut self.interpretation, value, "interpretation")
    }

    pub fn set_clarifying_questions(&mut self, value: Vec<String>) -> Result<(), DomainError> {
        set_once(&mut self.clarifying_questions, value, "clarifying_questions")
    }

    pub fn set_extracted_parameters(
        &mut self,
        value: ExtractedParameters,
    ) -> Result<(), DomainError> {
        set_once(&mut self.extracted_parameters, value, "extracted_parameters")
    }

    pub fn set_technical_result(&mut self, value: TechnicalResult) -> Result<(), DomainError> {
        set_once(&mut self.technical_result, value, "technical_result")
    }

    pub fn set_synthesis(&mut self, value: Synthesis) -> Result<(), DomainError> {
        set_once(&mut self.synthesis, value, "synthesis")
    }

    pub fn record_error(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        let message = message.into();
        let message = if message.trim().is_empty() { "unknown failure".to_owned() } else { message };
        set_once(&mut self.error_message, message, "error_message")
    }

    pub fn set_final_response(&mut self, value: impl Into<String>) -> Result<(), DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "final_response must not be empty".to_owned(),
            ));
        }
        set_once(&mut self.final_response, value, "final_response")
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) -> Result<(), DomainError> {
    if slot.is_some() {
        return Err(DomainError::InvariantViolation(format!("{field} was already written")));
    }
    *slot = Some(value);
    Ok(())
}
