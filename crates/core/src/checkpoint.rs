use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::analysis::ToolInvocation;
use crate::domain::workflow::WorkflowState;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint storage failure: {0}")]
    Storage(String),
    #[error("checkpoint serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What survives between runs of one thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadCheckpoint {
    pub thread_id: String,
    /// Query invocations across runs, oldest first, bounded by the store owner.
    pub executed_queries: Vec<ToolInvocation>,
    pub last_state: Option<WorkflowState>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadCheckpoint {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            executed_queries: Vec::new(),
            last_state: None,
            updated_at: Utc::now(),
        }
    }

    /// Appends the query invocations of a finished run and keeps the newest
    /// `keep` of them.
    pub fn record_run(&mut self, state: WorkflowState, keep: usize) {
        if let Some(result) = state.technical_result() {
            self.executed_queries
                .extend(result.tool_invocations.iter().filter(|call| call.is_query()).cloned());
        }
        let overflow = self.executed_queries.len().saturating_sub(keep);
        self.executed_queries.drain(..overflow);
        self.last_state = Some(state);
        self.updated_at = Utc::now();
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<ThreadCheckpoint>, CheckpointError>;
    async fn put(&self, checkpoint: ThreadCheckpoint) -> Result<(), CheckpointError>;
}
