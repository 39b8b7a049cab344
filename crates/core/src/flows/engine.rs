use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{FlowContext, TransitionOutcome, WorkflowEvent, WorkflowStage};

pub trait FlowDefinition {
    fn initial_state(&self) -> WorkflowStage;
    fn transition(
        &self,
        current: &WorkflowStage,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Fixed topology of a single question run:
/// `Start -> Interpreting -> (Clarifying | Analyzing -> Synthesizing) -> End`,
/// with `ErrorHandled -> End` reachable from every working stage.
#[derive(Clone, Debug, Default)]
pub struct AnalysisFlow;

impl AnalysisFlow {
    /// Every legal edge, labelled with the event that drives it.
    pub fn edges() -> Vec<(WorkflowStage, WorkflowStage, WorkflowEvent)> {
        use WorkflowEvent::*;
        use WorkflowStage::*;

        let mut edges = vec![
            (Start, Interpreting, Begin),
            (Interpreting, Clarifying, InterpretationCompleted),
            (Interpreting, Analyzing, InterpretationCompleted),
            (Clarifying, End, ClarificationPrepared),
            (Analyzing, Synthesizing, AnalysisCompleted),
            (Synthesizing, End, SynthesisCompleted),
        ];
        for stage in [Start, Interpreting, Clarifying, Analyzing, Synthesizing] {
            edges.push((stage, ErrorHandled, StageFailed));
        }
        edges.push((ErrorHandled, End, ErrorReported));
        edges
    }

    /// Mermaid flowchart of [`AnalysisFlow::edges`].
    pub fn render_mermaid() -> String {
        let mut out = String::from("flowchart TD\n");
        for (from, to, event) in Self::edges() {
            out.push_str(&format!("    {from:?} -->|{event:?}| {to:?}\n"));
        }
        out
    }
}

impl FlowDefinition for AnalysisFlow {
    fn initial_state(&self) -> WorkflowStage {
        WorkflowStage::Start
    }

    fn transition(
        &self,
        current: &WorkflowStage,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_analysis(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> WorkflowStage {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &WorkflowStage,
        event: &WorkflowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &WorkflowStage,
        event: &WorkflowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => sink.emit(
                audit
                    .event("workflow.transition_applied", AuditCategory::Flow, AuditOutcome::Success)
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
            ),
            Err(error) => sink.emit(
                audit
                    .event(
                        "workflow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

impl Default for FlowEngine<AnalysisFlow> {
    fn default() -> Self {
        Self::new(AnalysisFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: WorkflowStage, event: WorkflowEvent },
    #[error("an error is pending in {state:?}; only error handling may run, got {event:?}")]
    ErrorPending { state: WorkflowStage, event: WorkflowEvent },
}

fn transition_analysis(
    current: &WorkflowStage,
    event: &WorkflowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use WorkflowEvent::{
        AnalysisCompleted, Begin, ClarificationPrepared, ErrorReported, InterpretationCompleted,
        StageFailed, SynthesisCompleted,
    };
    use WorkflowStage::{
        Analyzing, Clarifying, End, ErrorHandled, Interpreting, Start, Synthesizing,
    };

    if context.error_pending && !matches!(event, StageFailed | ErrorReported) {
        return Err(FlowTransitionError::ErrorPending {
            state: current.clone(),
            event: event.clone(),
        });
    }

    let to = match (current, event) {
        (Start, Begin) => Interpreting,
        (Interpreting, InterpretationCompleted) if context.needs_clarification => Clarifying,
        (Interpreting, InterpretationCompleted) => Analyzing,
        (Clarifying, ClarificationPrepared) | (Synthesizing, SynthesisCompleted) => End,
        (Analyzing, AnalysisCompleted) => Synthesizing,
        (Start | Interpreting | Clarifying | Analyzing | Synthesizing, StageFailed) => {
            ErrorHandled
        }
        (ErrorHandled, ErrorReported) => End,
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone() })
}
