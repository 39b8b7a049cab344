use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStage {
    Start,
    Interpreting,
    Clarifying,
    Analyzing,
    Synthesizing,
    ErrorHandled,
    End,
}

impl WorkflowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    Begin,
    InterpretationCompleted,
    ClarificationPrepared,
    AnalysisCompleted,
    SynthesisCompleted,
    StageFailed,
    ErrorReported,
}

/// Facts recorded on the workflow state that steer routing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub needs_clarification: bool,
    pub error_pending: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowStage,
    pub to: WorkflowStage,
    pub event: WorkflowEvent,
}
