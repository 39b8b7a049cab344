//! Agent runtime: reasoning client, warehouse tools and the question pipeline.
//!
//! This crate provides the moving parts around the pure core:
//! - A pluggable reasoning capability (`llm`) with an OpenAI-compatible HTTP
//!   client (`openai`) for hosted OpenAI and local Ollama models
//! - The read-only query guard (`guardrails`) in front of the warehouse
//! - The tools bound to the data agent (`tools`)
//! - The interpretation, analysis and synthesis stages (`stages`)
//! - The orchestrator that drives a question through the flow (`runtime`)
//!
//! # Architecture
//!
//! Every question follows a constrained loop:
//! 1. **Interpretation** - clarification decision, parameter extraction and the
//!    business reading of the question
//! 2. **Clarification exit** - only when the subject is completely unspecified
//! 3. **Technical analysis** - a bounded tool loop, backed by a default query
//! 4. **Synthesis** - a business answer, or a deterministic no-data statement
//!
//! # Safety Principle
//!
//! The model never decides routing and never touches the warehouse directly.
//! Routing is the deterministic flow in `funnelsight_core::flows`; every
//! statement the model writes passes the query guard first.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod openai;
pub mod prompts;
pub mod runtime;
pub mod stages;
pub mod tools;

pub use conversation::{chat_window, Transcript};
pub use guardrails::{GuardrailDecision, QueryGuard};
pub use llm::{
    ChatMessage, ChatRole, LlmClient, LlmError, LlmReply, LlmRequest, ToolCall, ToolSpec,
};
pub use openai::OpenAiCompatibleClient;
pub use runtime::{AnalysisOrchestrator, RunMetadata, RunOutcome, RunResponse};
pub use stages::StageError;
pub use tools::{Tool, ToolRegistry};
