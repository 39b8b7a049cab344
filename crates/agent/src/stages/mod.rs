//! Stage adapters driven by the orchestrator. Each stage reads typed inputs
//! from the workflow state and returns the one output it owns.

use thiserror::Error;

use funnelsight_core::errors::{ApplicationError, DomainError};

use crate::llm::LlmError;

pub mod analysis;
pub mod interpretation;
pub mod synthesis;

pub use analysis::{fallback_query, AnalysisStage};
pub use interpretation::InterpretationStage;
pub use synthesis::{no_data_response, SynthesisStage};

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Capability(#[from] LlmError),
    #[error(transparent)]
    Invariant(#[from] DomainError),
}

impl From<StageError> for ApplicationError {
    fn from(value: StageError) -> Self {
        match value {
            StageError::Capability(error) => Self::Reasoning(error.to_string()),
            StageError::Invariant(error) => Self::Domain(error),
        }
    }
}
