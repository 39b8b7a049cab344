pub mod audit;
pub mod checkpoint;
pub mod clarification;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extraction;
pub mod flows;
pub mod text;
pub mod verbosity;
pub mod warehouse;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use checkpoint::{CheckpointError, CheckpointStore, ThreadCheckpoint};
pub use clarification::{
    format_clarification, Assumption, ClarificationDecision, ClarificationPolicy, OverrideReason,
};
pub use domain::analysis::{
    DateRange, ExecutedQuery, ExtractedParameters, Interpretation, ParameterKind, QueryOrigin,
    QueryOutcome, Synthesis, TechnicalResult, ToolInvocation, ToolOutcome, Verbosity,
};
pub use domain::conversation::{ConversationTurn, Role};
pub use domain::workflow::WorkflowState;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use extraction::{ExtractionContext, ParameterExtractor};
pub use flows::{AnalysisFlow, FlowEngine, FlowTransitionError, WorkflowEvent, WorkflowStage};
pub use verbosity::detect_verbosity;
pub use warehouse::{ColumnInfo, QueryExecutor, QueryRows, SchemaIntrospector, WarehouseError};
