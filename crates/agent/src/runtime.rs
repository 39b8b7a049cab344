use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use funnelsight_core::audit::{
    AuditCategory, AuditContext, AuditOutcome, AuditSink, TracingAuditSink,
};
use funnelsight_core::checkpoint::{CheckpointStore, ThreadCheckpoint};
use funnelsight_core::clarification::format_clarification;
use funnelsight_core::config::AppConfig;
use funnelsight_core::domain::conversation::{last_user_question, ConversationTurn};
use funnelsight_core::domain::workflow::WorkflowState;
use funnelsight_core::errors::{ApplicationError, DomainError};
use funnelsight_core::extraction::{ExtractionContext, ParameterExtractor};
use funnelsight_core::flows::{
    AnalysisFlow, FlowContext, FlowEngine, WorkflowEvent, WorkflowStage,
};
use funnelsight_core::warehouse::{QueryExecutor, SchemaIntrospector};

use crate::llm::LlmClient;
use crate::stages::{AnalysisStage, InterpretationStage, SynthesisStage};
use crate::tools::ToolRegistry;

const ACTOR: &str = "orchestrator";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Answered,
    Clarification,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub tools_used: Vec<String>,
    pub analysis_completed: bool,
    pub thread_id: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub used_fallback: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    pub response: String,
    pub needs_clarification: bool,
    pub clarifying_questions: Vec<String>,
    pub metadata: RunMetadata,
}

impl RunResponse {
    pub fn outcome(&self) -> RunOutcome {
        if !self.success {
            RunOutcome::Failed
        } else if self.needs_clarification {
            RunOutcome::Clarification
        } else {
            RunOutcome::Answered
        }
    }

    fn from_state(state: &WorkflowState, thread_id: &str, run_id: &str) -> Self {
        let result = state.technical_result();
        let metadata = RunMetadata {
            tools_used: result.map(|result| result.tools_used()).unwrap_or_default(),
            analysis_completed: result.is_some() && !state.error_occurred(),
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            error: state.error_message().map(str::to_string),
            used_fallback: result.is_some_and(|result| result.used_fallback()),
        };

        if let Some(message) = state.error_message() {
            return Self {
                success: false,
                response: error_response(message),
                needs_clarification: false,
                clarifying_questions: Vec::new(),
                metadata,
            };
        }
        Self {
            success: true,
            response: state.final_response().unwrap_or_default().to_string(),
            needs_clarification: state.needs_clarification(),
            clarifying_questions: state.clarifying_questions().to_vec(),
            metadata,
        }
    }
}

pub fn error_response(message: &str) -> String {
    format!(
        "Error: {message}. Please try rephrasing your question or be more specific about time \
         periods, markets, or device types."
    )
}

/// Drives one question through interpretation, clarification or analysis and
/// synthesis. Shared by `Arc`; every run owns its own workflow state.
pub struct AnalysisOrchestrator {
    interpretation: InterpretationStage,
    analysis: AnalysisStage,
    synthesis: SynthesisStage,
    engine: FlowEngine<AnalysisFlow>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    audit: Arc<dyn AuditSink>,
    checkpoint_history: usize,
    reference_date: Option<NaiveDate>,
}

impl AnalysisOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn QueryExecutor>,
        introspector: Arc<dyn SchemaIntrospector>,
        config: &AppConfig,
    ) -> Self {
        let tools = ToolRegistry::for_warehouse(executor, introspector, &config.warehouse);
        Self {
            interpretation: InterpretationStage::new(
                llm.clone(),
                &config.workflow,
                config.llm.business_temperature,
            ),
            analysis: AnalysisStage::new(
                llm.clone(),
                tools,
                config.warehouse.table.clone(),
                &config.workflow,
                config.llm.data_temperature,
            ),
            synthesis: SynthesisStage::new(llm, &config.workflow, config.llm.business_temperature),
            engine: FlowEngine::default(),
            checkpoints: None,
            audit: Arc::new(TracingAuditSink),
            checkpoint_history: config.workflow.checkpoint_history,
            reference_date: None,
        }
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Pins "today" for relative periods and the default query window.
    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = Some(reference_date);
        self.analysis = self.analysis.with_reference_date(reference_date);
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.analysis.tools().names()
    }

    pub async fn run(
        &self,
        question: &str,
        thread_id: &str,
        history: &[ConversationTurn],
    ) -> RunResponse {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", correlation_id = %run_id, thread_id = %thread_id);
        self.run_in_span(question, thread_id, history, &run_id).instrument(span).await
    }

    async fn run_in_span(
        &self,
        question: &str,
        thread_id: &str,
        history: &[ConversationTurn],
        run_id: &str,
    ) -> RunResponse {
        let audit = AuditContext::new(Some(thread_id.to_string()), run_id, ACTOR);
        self.audit.emit(
            audit
                .event("run.received", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("history_turns", history.len().to_string()),
        );

        let mut state = WorkflowState::new(question, history.to_vec());
        let mut cursor = FlowCursor::new(&self.engine, self.audit.as_ref(), audit.clone());
        let checkpoint = self.load_checkpoint(thread_id, &audit).await;

        if let Err(failure) = self.drive(&mut state, &mut cursor, checkpoint.as_ref()).await {
            self.handle_failure(&mut state, &mut cursor, failure);
        }
        if !cursor.stage.is_terminal() {
            warn!(event_name = "run.unfinished", stage = ?cursor.stage, "run stopped before End");
        }

        self.save_checkpoint(thread_id, checkpoint, &state, &audit).await;
        let response = RunResponse::from_state(&state, thread_id, run_id);

        let outcome = match response.outcome() {
            RunOutcome::Failed => AuditOutcome::Failed,
            RunOutcome::Answered | RunOutcome::Clarification => AuditOutcome::Success,
        };
        self.audit.emit(
            audit
                .event("run.completed", AuditCategory::Flow, outcome)
                .with_metadata("outcome", format!("{:?}", response.outcome()))
                .with_metadata("tools_used", response.metadata.tools_used.join(",")),
        );
        info!(
            event_name = "run.completed",
            outcome = ?response.outcome(),
            tools_used = response.metadata.tools_used.len(),
            used_fallback = response.metadata.used_fallback,
            "run completed"
        );
        response
    }

    async fn drive(
        &self,
        state: &mut WorkflowState,
        cursor: &mut FlowCursor<'_>,
        checkpoint: Option<&ThreadCheckpoint>,
    ) -> Result<(), ApplicationError> {
        cursor.advance(WorkflowEvent::Begin)?;
        let question = state.question().trim().to_string();
        if question.is_empty() {
            return Err(DomainError::InvariantViolation("question is empty".to_string()).into());
        }
        let history = state.history().to_vec();

        let decision = self.interpretation.assess(&question, &history);
        let mut decided = cursor
            .audit
            .event("clarification.decided", AuditCategory::Flow, AuditOutcome::Success)
            .with_metadata("needs_clarification", decision.needs_clarification.to_string());
        if let Some(reason) = &decision.override_reason {
            decided = decided.with_metadata("override_reason", reason.label());
        }
        self.audit.emit(decided);
        let context = extraction_context(&history, checkpoint);
        let extractor = ParameterExtractor::new(self.reference_date());
        let parameters = extractor.extract(&question, &context);
        state.set_extracted_parameters(parameters.clone())?;

        let assumptions: Vec<String> = decision
            .assumptions
            .iter()
            .filter(|assumption| !parameters.has(assumption.kind))
            .map(|assumption| assumption.text.clone())
            .collect();
        let interpretation =
            self.interpretation.interpret(&question, &history, &assumptions).await?;
        state.set_interpretation(interpretation.clone())?;

        if decision.needs_clarification {
            info!(
                event_name = "run.clarification_requested",
                questions = decision.questions.len(),
                "asking for clarification"
            );
            state.set_clarifying_questions(decision.questions.clone())?;
            cursor.context.needs_clarification = true;
            cursor.advance(WorkflowEvent::InterpretationCompleted)?;
            state.set_final_response(format_clarification(&decision.questions))?;
            cursor.advance(WorkflowEvent::ClarificationPrepared)?;
            return Ok(());
        }

        cursor.advance(WorkflowEvent::InterpretationCompleted)?;
        let result = self.analysis.analyze(&question, &interpretation, &parameters).await?;
        state.set_technical_result(result.clone())?;
        cursor.advance(WorkflowEvent::AnalysisCompleted)?;

        let synthesis = self.synthesis.synthesize(&question, &result, &history).await?;
        state.set_final_response(synthesis.text.clone())?;
        state.set_synthesis(synthesis)?;
        cursor.advance(WorkflowEvent::SynthesisCompleted)?;
        Ok(())
    }

    fn handle_failure(
        &self,
        state: &mut WorkflowState,
        cursor: &mut FlowCursor<'_>,
        failure: ApplicationError,
    ) {
        let message = failure_message(&failure);
        let interface = failure.clone().into_interface(cursor.audit.correlation_id.clone());
        error!(
            event_name = "run.failed",
            stage = ?cursor.stage,
            error = %failure,
            user_message = interface.user_message(),
            "run failed"
        );
        self.audit.emit(
            cursor
                .audit
                .event("run.failed", AuditCategory::System, AuditOutcome::Failed)
                .with_metadata("error", interface.to_string()),
        );
        if let Err(violation) = state.record_error(message.clone()) {
            warn!(event_name = "run.error_already_recorded", error = %violation, "error kept");
        }

        cursor.context.error_pending = true;
        if let Err(transition) = cursor.advance(WorkflowEvent::StageFailed) {
            warn!(event_name = "run.error_route_rejected", error = %transition, "cannot route");
        }
        if state.final_response().is_none() {
            let recorded = state.error_message().unwrap_or(message.as_str()).to_string();
            if let Err(violation) = state.set_final_response(error_response(&recorded)) {
                warn!(event_name = "run.error_response_rejected", error = %violation, "skipped");
            }
        }
        if let Err(transition) = cursor.advance(WorkflowEvent::ErrorReported) {
            warn!(event_name = "run.error_route_rejected", error = %transition, "cannot route");
        }
    }

    async fn load_checkpoint(
        &self,
        thread_id: &str,
        audit: &AuditContext,
    ) -> Option<ThreadCheckpoint> {
        let store = self.checkpoints.as_ref()?;
        match store.get(thread_id).await {
            Ok(checkpoint) => checkpoint,
            Err(error) => {
                warn!(
                    event_name = "checkpoint.load_failed",
                    error = %error,
                    "continuing without thread memory"
                );
                self.audit.emit(
                    audit
                        .event(
                            "checkpoint.load_failed",
                            AuditCategory::Persistence,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("error", error.to_string()),
                );
                None
            }
        }
    }

    async fn save_checkpoint(
        &self,
        thread_id: &str,
        checkpoint: Option<ThreadCheckpoint>,
        state: &WorkflowState,
        audit: &AuditContext,
    ) {
        let Some(store) = self.checkpoints.as_ref() else {
            return;
        };
        let mut checkpoint = checkpoint.unwrap_or_else(|| ThreadCheckpoint::new(thread_id));
        checkpoint.record_run(state.clone(), self.checkpoint_history);

        let (event_type, outcome) = match store.put(checkpoint).await {
            Ok(()) => ("checkpoint.saved", AuditOutcome::Success),
            Err(error) => {
                warn!(event_name = "checkpoint.save_failed", error = %error, "checkpoint lost");
                ("checkpoint.save_failed", AuditOutcome::Failed)
            }
        };
        self.audit.emit(audit.event(event_type, AuditCategory::Persistence, outcome));
    }
}

/// Earlier queries on the thread plus the previous question, from the caller's
/// history when it has one and from the checkpoint otherwise.
fn extraction_context(
    history: &[ConversationTurn],
    checkpoint: Option<&ThreadCheckpoint>,
) -> ExtractionContext {
    let previous_question = last_user_question(history).map(str::to_string).or_else(|| {
        checkpoint
            .and_then(|checkpoint| checkpoint.last_state.as_ref())
            .map(|state| state.question().to_string())
    });
    ExtractionContext {
        prior_invocations: checkpoint
            .map(|checkpoint| checkpoint.executed_queries.clone())
            .unwrap_or_default(),
        previous_question,
    }
}

fn failure_message(failure: &ApplicationError) -> String {
    match failure {
        ApplicationError::Domain(DomainError::InvariantViolation(message)) => message.clone(),
        ApplicationError::Reasoning(message) => {
            format!("the reasoning service could not be reached ({message})")
        }
        other => other.to_string(),
    }
}

/// Current stage of one run, advanced only through the flow engine.
struct FlowCursor<'a> {
    engine: &'a FlowEngine<AnalysisFlow>,
    sink: &'a dyn AuditSink,
    audit: AuditContext,
    stage: WorkflowStage,
    context: FlowContext,
}

impl<'a> FlowCursor<'a> {
    fn new(
        engine: &'a FlowEngine<AnalysisFlow>,
        sink: &'a dyn AuditSink,
        audit: AuditContext,
    ) -> Self {
        Self {
            stage: engine.initial_state(),
            engine,
            sink,
            audit,
            context: FlowContext::default(),
        }
    }

    fn advance(&mut self, event: WorkflowEvent) -> Result<(), ApplicationError> {
        let outcome = self
            .engine
            .apply_with_audit(&self.stage, &event, &self.context, self.sink, &self.audit)
            .map_err(DomainError::from)?;
        self.stage = outcome.to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Local, NaiveDate};
    use serde_json::json;

    use funnelsight_core::audit::InMemoryAuditSink;
    use funnelsight_core::config::AppConfig;
    use funnelsight_core::domain::conversation::ConversationTurn;
    use funnelsight_core::warehouse::{
        ColumnInfo, QueryExecutor, QueryRows, SchemaIntrospector, WarehouseError,
    };

    use super::{error_response, AnalysisOrchestrator, RunOutcome};
    use crate::llm::{LlmError, LlmReply};
    use crate::stages::testing::ScriptedLlm;

    struct OneRowWarehouse;

    #[async_trait]
    impl QueryExecutor for OneRowWarehouse {
        async fn execute(&self, _sql: &str) -> Result<QueryRows, WarehouseError> {
            Ok(QueryRows {
                columns: vec!["culture".to_string(), "traffic".to_string()],
                rows: vec![vec![json!("CL"), json!(3100)]],
            })
        }
    }

    #[async_trait]
    impl SchemaIntrospector for OneRowWarehouse {
        async fn describe(&self, _table: &str) -> Result<Vec<ColumnInfo>, WarehouseError> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(llm: Arc<ScriptedLlm>, sink: InMemoryAuditSink) -> AnalysisOrchestrator {
        let warehouse = Arc::new(OneRowWarehouse);
        AnalysisOrchestrator::new(llm, warehouse.clone(), warehouse, &AppConfig::default())
            .with_audit_sink(Arc::new(sink))
            .with_reference_date(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))
    }

    #[test]
    fn reference_date_defaults_to_the_local_calendar_day() {
        let warehouse = Arc::new(OneRowWarehouse);
        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(ScriptedLlm::default()),
            warehouse.clone(),
            warehouse,
            &AppConfig::default(),
        );

        let before = Local::now().date_naive();
        let reference = orchestrator.reference_date();
        let after = Local::now().date_naive();
        assert!(reference == before || reference == after);
    }

    #[tokio::test]
    async fn answered_runs_walk_the_full_flow() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(LlmReply::text("Traffic for Chile.")),
            Ok(LlmReply::text("No tools needed.")),
            Ok(LlmReply::text("Chile had 3,100 sessions.")),
        ]));
        let sink = InMemoryAuditSink::default();

        let response = orchestrator(llm, sink.clone()).run("traffic Chile", "t-1", &[]).await;

        assert_eq!(response.outcome(), RunOutcome::Answered);
        assert_eq!(response.response, "Chile had 3,100 sessions.");
        assert_eq!(response.metadata.tools_used, vec!["sql_query"]);
        assert!(response.metadata.used_fallback);
        assert!(response.metadata.analysis_completed);
        assert_eq!(sink.events_of_type("workflow.transition_applied").len(), 4);
        assert_eq!(sink.events_of_type("run.completed").len(), 1);
    }

    #[tokio::test]
    async fn vague_questions_exit_through_clarification() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(LlmReply::text("Unclear request."))]));
        let sink = InMemoryAuditSink::default();

        let response = orchestrator(llm.clone(), sink).run("how are we doing?", "t-2", &[]).await;

        assert_eq!(response.outcome(), RunOutcome::Clarification);
        assert!(response.success);
        assert!(response.response.starts_with("To answer accurately:\n1. "));
        assert!(!response.clarifying_questions.is_empty());
        assert!(!response.metadata.analysis_completed);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn capability_failures_end_in_the_error_exit() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Transport(
            "connection refused".to_string(),
        ))]));
        let sink = InMemoryAuditSink::default();

        let response =
            orchestrator(llm, sink.clone()).run("conversion rate Chile", "t-3", &[]).await;

        assert_eq!(response.outcome(), RunOutcome::Failed);
        assert!(response.response.starts_with("Error: the reasoning service could not be reached"));
        assert!(response.response.ends_with("markets, or device types."));
        assert!(response.metadata.error.is_some());
        assert!(sink.events_of_type("workflow.transition_rejected").is_empty());

        let failed = sink.events_of_type("run.failed");
        assert_eq!(failed.len(), 1);
        assert!(failed[0].metadata.get("error").is_some_and(|error| error.starts_with("service")));
    }

    #[tokio::test]
    async fn blank_questions_fail_without_calling_the_model() {
        let llm = Arc::new(ScriptedLlm::default());
        let response = orchestrator(llm.clone(), InMemoryAuditSink::default())
            .run("   ", "t-4", &[ConversationTurn::user("traffic Peru")])
            .await;

        assert_eq!(response.outcome(), RunOutcome::Failed);
        assert_eq!(response.response, error_response("question is empty"));
        assert!(llm.requests().is_empty());
    }
}
