use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use funnelsight_core::config::WorkflowConfig;
use funnelsight_core::domain::analysis::{
    ExecutedQuery, ExtractedParameters, Interpretation, ParameterKind, QueryOrigin, QueryOutcome,
    TechnicalResult, ToolInvocation, SQL_QUERY_TOOL,
};
use funnelsight_core::extraction::ParameterExtractor;

use super::StageError;
use crate::llm::{ChatMessage, LlmClient, LlmRequest, ToolCall};
use crate::prompts::{analysis_request, data_analyst_prompt};
use crate::tools::{outcome_from_output, ToolRegistry};

const FALLBACK_ROW_LIMIT: usize = 50;

/// Data analyst stage: a bounded tool loop over the warehouse tools, backed by
/// a default query whenever the agent produced no usable one.
pub struct AnalysisStage {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    table: String,
    max_tool_rounds: usize,
    fallback_window_days: u32,
    temperature: f32,
    reference_date: Option<NaiveDate>,
}

impl AnalysisStage {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        table: impl Into<String>,
        workflow: &WorkflowConfig,
        temperature: f32,
    ) -> Self {
        Self {
            llm,
            tools,
            table: table.into(),
            max_tool_rounds: workflow.max_tool_rounds.max(1),
            fallback_window_days: workflow.fallback_window_days.max(1),
            temperature,
            reference_date: None,
        }
    }

    /// Pins "today" for prompts and the default query window.
    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = Some(reference_date);
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub async fn analyze(
        &self,
        question: &str,
        interpretation: &Interpretation,
        parameters: &ExtractedParameters,
    ) -> Result<TechnicalResult, StageError> {
        let today = self.reference_date();
        let system_prompt = data_analyst_prompt(&self.table, today);
        let specs = self.tools.specs();
        let mut messages =
            vec![ChatMessage::user(analysis_request(question, interpretation, parameters))];
        let mut result =
            TechnicalResult { parameters: parameters.clone(), ..TechnicalResult::default() };

        let mut analysis_text = None;
        for round in 1..=self.max_tool_rounds {
            let request = LlmRequest::new(system_prompt.clone(), self.temperature)
                .with_messages(messages.clone())
                .with_tools(specs.clone());
            let reply = self.llm.invoke(request).await?;
            if !reply.has_tool_calls() {
                analysis_text = Some(reply.text);
                break;
            }

            debug!(
                event_name = "stage.analysis.tool_round",
                round,
                calls = reply.tool_calls.len(),
                "data agent requested tools"
            );
            messages.push(ChatMessage::assistant_with_tools(
                reply.text.clone(),
                reply.tool_calls.clone(),
            ));
            for call in &reply.tool_calls {
                let content = self.run_tool(call, &mut result).await;
                messages.push(ChatMessage::tool_result(call.id.clone(), content));
            }
        }

        let analysis_text = match analysis_text {
            Some(text) => text,
            None => {
                // Rounds exhausted with tool calls still pending: ask for the
                // write-up without offering tools again.
                let request = LlmRequest::new(system_prompt, self.temperature)
                    .with_messages(messages);
                self.llm.invoke(request).await?.text
            }
        };
        result.analysis_text = analysis_text.trim().to_string();

        let agent_query_succeeded =
            result.tool_invocations.iter().any(|call| call.is_query() && call.is_success());
        if !agent_query_succeeded {
            self.run_fallback(question, today, &mut result).await;
        }

        info!(
            event_name = "stage.analysis.completed",
            queries = result.queries.len(),
            data_available = result.data_available(),
            used_fallback = result.used_fallback(),
            "technical analysis completed"
        );
        Ok(result)
    }

    /// Runs one requested tool and returns the content fed back to the agent.
    /// Tool failures are recorded, never raised.
    async fn run_tool(&self, call: &ToolCall, result: &mut TechnicalResult) -> String {
        match self.tools.execute(&call.name, call.arguments.clone()).await {
            Ok(output) => {
                if call.name == SQL_QUERY_TOOL {
                    result.queries.push(ExecutedQuery {
                        sql: executed_sql(&output, &call.arguments),
                        origin: QueryOrigin::Agent,
                        outcome: outcome_from_output(&output),
                    });
                }
                let content = output.to_string();
                result.tool_invocations.push(ToolInvocation::succeeded(
                    call.name.clone(),
                    call.arguments.clone(),
                    output,
                ));
                content
            }
            Err(error) => {
                let message = error.to_string();
                warn!(
                    event_name = "stage.analysis.tool_failed",
                    tool = %call.name,
                    error = %message,
                    "tool invocation failed"
                );
                if call.name == SQL_QUERY_TOOL {
                    result.queries.push(ExecutedQuery {
                        sql: executed_sql(&Value::Null, &call.arguments),
                        origin: QueryOrigin::Agent,
                        outcome: QueryOutcome::Failed { reason: message.clone() },
                    });
                }
                result.notes.push(format!("{} failed: {message}", call.name));
                result.tool_invocations.push(ToolInvocation::failed(
                    call.name.clone(),
                    call.arguments.clone(),
                    message.clone(),
                ));
                json!({ "success": false, "error": message }).to_string()
            }
        }
    }

    async fn run_fallback(&self, question: &str, today: NaiveDate, result: &mut TechnicalResult) {
        let narrowing = ParameterExtractor::new(today).scan_text(question);
        let sql = fallback_query(&self.table, today, self.fallback_window_days, &narrowing);
        let arguments = json!({ "query": sql });
        info!(
            event_name = "stage.analysis.fallback_query",
            window_days = self.fallback_window_days,
            "running default query"
        );

        let outcome = match self.tools.execute(SQL_QUERY_TOOL, arguments.clone()).await {
            Ok(output) => {
                let outcome = outcome_from_output(&output);
                result.tool_invocations.push(ToolInvocation::succeeded(
                    SQL_QUERY_TOOL,
                    arguments,
                    output,
                ));
                outcome
            }
            Err(error) => {
                let message = error.to_string();
                warn!(
                    event_name = "stage.analysis.fallback_failed",
                    error = %message,
                    "default query failed"
                );
                result.tool_invocations.push(ToolInvocation::failed(
                    SQL_QUERY_TOOL,
                    arguments,
                    message.clone(),
                ));
                QueryOutcome::Failed { reason: message }
            }
        };
        result.notes.push(format!(
            "No successful query from the data agent; ran the default query over the last {} days.",
            self.fallback_window_days
        ));
        result.queries.push(ExecutedQuery { sql, origin: QueryOrigin::Fallback, outcome });
    }
}

fn executed_sql(output: &Value, arguments: &Value) -> String {
    output
        .get("query")
        .or_else(|| arguments.get("query"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Default query: per market and device totals over the last `window_days`
/// days up to `today`, narrowed to the markets and devices in `narrowing`.
pub fn fallback_query(
    table: &str,
    today: NaiveDate,
    window_days: u32,
    narrowing: &ExtractedParameters,
) -> String {
    let start = today - Duration::days(i64::from(window_days.max(1)) - 1);
    let mut filters = vec![format!(
        "date BETWEEN '{}' AND '{}'",
        start.format("%Y-%m-%d"),
        today.format("%Y-%m-%d")
    )];
    for (kind, column) in [(ParameterKind::Market, "culture"), (ParameterKind::Device, "device")] {
        let values: Vec<String> = narrowing
            .get(kind)
            .map(|values| {
                values
                    .iter()
                    .filter(|value| value.chars().all(|c| c.is_ascii_alphanumeric()))
                    .map(|value| format!("'{value}'"))
                    .collect()
            })
            .unwrap_or_default();
        if !values.is_empty() {
            filters.push(format!("{column} IN ({})", values.join(", ")));
        }
    }

    format!(
        "SELECT culture, device, \
         SUM(traffic) AS traffic, \
         SUM(flight_dom_loaded_flight) AS flight_page_loads, \
         SUM(payment_confirmation_loaded) AS payment_confirmations, \
         ROUND(100.0 * SUM(payment_confirmation_loaded) / NULLIF(SUM(traffic), 0), 2) \
         AS conversion_rate_pct \
         FROM {table} \
         WHERE {} \
         GROUP BY culture, device \
         ORDER BY traffic DESC \
         LIMIT {FALLBACK_ROW_LIMIT}",
        filters.join(" AND ")
    )
}
