use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use funnelsight_core::domain::analysis::{QueryOutcome, SQL_QUERY_TOOL};
use funnelsight_core::warehouse::QueryExecutor;

use super::Tool;
use crate::guardrails::QueryGuard;
use crate::llm::ToolSpec;

/// Runs one read-only statement against the funnel table and returns at most
/// `max_rows` records.
pub struct SqlQueryTool {
    executor: Arc<dyn QueryExecutor>,
    guard: QueryGuard,
    max_rows: usize,
}

impl SqlQueryTool {
    pub fn new(executor: Arc<dyn QueryExecutor>, guard: QueryGuard, max_rows: usize) -> Self {
        Self { executor, guard, max_rows: max_rows.max(1) }
    }
}

#[async_trait]
impl Tool for SqlQueryTool {
    fn name(&self) -> &'static str {
        SQL_QUERY_TOOL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: SQL_QUERY_TOOL.to_string(),
            description: format!(
                "Execute one read-only SQL query (SELECT or WITH) against the `{}` table. \
                 Returns column names, up to {} rows as records, and the total row count.",
                self.guard.table(),
                self.max_rows
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "SQL query to execute" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = input
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("sql_query requires a string `query` argument"))?;

        let statement = self.guard.check(query).inspect_err(|error| {
            warn!(event_name = "tool.sql_query.rejected", error = %error, "query rejected");
        })?;
        let rows = self.executor.execute(&statement).await?;

        let truncated = rows.len() > self.max_rows;
        debug!(
            event_name = "tool.sql_query.completed",
            rows_returned = rows.len(),
            truncated,
            "query tool completed"
        );

        Ok(json!({
            "success": true,
            "query": statement,
            "rows_returned": rows.len(),
            "columns": rows.columns,
            "data": rows.records(self.max_rows),
            "truncated": truncated,
        }))
    }
}

/// Reads a `sql_query` tool output back into a typed outcome.
pub fn outcome_from_output(output: &Value) -> QueryOutcome {
    let Some(row_count) = output.get("rows_returned").and_then(Value::as_u64) else {
        return QueryOutcome::Failed { reason: "query output had no row count".to_string() };
    };
    if row_count == 0 {
        return QueryOutcome::Empty;
    }

    let columns: Vec<String> = output
        .get("columns")
        .and_then(Value::as_array)
        .map(|columns| columns.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let rows = output
        .get("data")
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .map(|record| {
                    columns
                        .iter()
                        .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    QueryOutcome::Rows {
        columns,
        rows,
        row_count: row_count as usize,
        truncated: output.get("truncated").and_then(Value::as_bool).unwrap_or(false),
    }
}
