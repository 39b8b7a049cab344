use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SQL_QUERY_TOOL: &str = "sql_query";
pub const DATA_ANALYSIS_TOOL: &str = "data_analysis";
pub const SCHEMA_INFO_TOOL: &str = "get_schema_info";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Date,
    Market,
    Device,
    TrafficSource,
    Metric,
}

impl ParameterKind {
    pub const ALL: [ParameterKind; 5] =
        [Self::Date, Self::Market, Self::Device, Self::TrafficSource, Self::Metric];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Market => "market",
            Self::Device => "device",
            Self::TrafficSource => "traffic source",
            Self::Metric => "metric",
        }
    }
}

/// Inclusive calendar range, rendered as `2025-08-01..2025-08-31`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start.format("%Y-%m-%d"))
        } else {
            write!(f, "{}..{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
        }
    }
}

impl FromStr for DateRange {
    type Err = chrono::ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once("..") {
            Some((start, end)) => {
                let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")?;
                let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")?;
                Ok(Self { start: start.min(end), end: start.max(end) })
            }
            None => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map(Self::single),
        }
    }
}

/// Entities recovered from the current question and earlier turns. Advisory:
/// the analysis stage seeds its prompt with them but never forces them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedParameters {
    values: BTreeMap<ParameterKind, BTreeSet<String>>,
}

impl ExtractedParameters {
    pub fn insert(&mut self, kind: ParameterKind, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.values.entry(kind).or_default().insert(value);
    }

    pub fn insert_date_range(&mut self, range: DateRange) {
        self.insert(ParameterKind::Date, range.to_string());
    }

    pub fn get(&self, kind: ParameterKind) -> Option<&BTreeSet<String>> {
        self.values.get(&kind).filter(|values| !values.is_empty())
    }

    pub fn contains(&self, kind: ParameterKind, value: &str) -> bool {
        self.get(kind).is_some_and(|values| values.contains(value))
    }

    pub fn has(&self, kind: ParameterKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(BTreeSet::is_empty)
    }

    pub fn date_ranges(&self) -> Vec<DateRange> {
        self.get(ParameterKind::Date)
            .map(|values| values.iter().filter_map(|value| value.parse().ok()).collect())
            .unwrap_or_default()
    }

    /// Copies every kind that is absent here from `fallback`.
    pub fn fill_missing_from(&mut self, fallback: &ExtractedParameters) {
        for (kind, values) in &fallback.values {
            if !self.has(*kind) && !values.is_empty() {
                self.values.insert(*kind, values.clone());
            }
        }
    }

    /// `market: CL; date: 2025-08-01..2025-08-31`, or an empty string.
    pub fn describe(&self) -> String {
        ParameterKind::ALL
            .iter()
            .filter_map(|kind| {
                self.get(*kind).map(|values| {
                    let joined = values.iter().cloned().collect::<Vec<_>>().join(", ");
                    format!("{}: {joined}", kind.label())
                })
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Succeeded { output: Value },
    Failed { error: String },
}

/// A tool call requested by the data agent, together with what happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: Value,
    pub outcome: ToolOutcome,
}

impl ToolInvocation {
    pub fn succeeded(tool: impl Into<String>, arguments: Value, output: Value) -> Self {
        Self { tool: tool.into(), arguments, outcome: ToolOutcome::Succeeded { output } }
    }

    pub fn failed(tool: impl Into<String>, arguments: Value, error: impl Into<String>) -> Self {
        Self { tool: tool.into(), arguments, outcome: ToolOutcome::Failed { error: error.into() } }
    }

    pub fn is_query(&self) -> bool {
        self.tool == SQL_QUERY_TOOL
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Succeeded { .. })
    }

    /// The SQL text of a `sql_query` invocation.
    pub fn query_text(&self) -> Option<&str> {
        if !self.is_query() {
            return None;
        }
        self.arguments.get("query").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub text: String,
    /// Defaults applied instead of asking, e.g. "all devices combined".
    pub assumptions: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrigin {
    Agent,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows { columns: Vec<String>, rows: Vec<Vec<Value>>, row_count: usize, truncated: bool },
    Empty,
    Failed { reason: String },
    NotExecuted,
}

impl QueryOutcome {
    pub fn has_rows(&self) -> bool {
        matches!(self, Self::Rows { row_count, .. } if *row_count > 0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutedQuery {
    pub sql: String,
    pub origin: QueryOrigin,
    pub outcome: QueryOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalResult {
    pub analysis_text: String,
    pub parameters: ExtractedParameters,
    pub queries: Vec<ExecutedQuery>,
    pub tool_invocations: Vec<ToolInvocation>,
    /// Non-fatal problems worth surfacing, such as a rejected agent query.
    pub notes: Vec<String>,
}

impl TechnicalResult {
    /// Aggregate outcome: rows beat an empty result, which beats a failure.
    /// `Empty` is the only outcome that licenses a "no data available" answer.
    pub fn outcome(&self) -> QueryOutcome {
        if let Some(query) = self.queries.iter().rev().find(|query| query.outcome.has_rows()) {
            return query.outcome.clone();
        }
        if self.queries.iter().any(|query| {
            matches!(query.outcome, QueryOutcome::Empty | QueryOutcome::Rows { .. })
        }) {
            return QueryOutcome::Empty;
        }
        match self.queries.iter().rev().find_map(|query| match &query.outcome {
            QueryOutcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        }) {
            Some(reason) => QueryOutcome::Failed { reason },
            None => QueryOutcome::NotExecuted,
        }
    }

    pub fn data_available(&self) -> bool {
        self.outcome().has_rows()
    }

    pub fn query_attempted(&self) -> bool {
        !self.queries.is_empty()
    }

    pub fn used_fallback(&self) -> bool {
        self.queries.iter().any(|query| query.origin == QueryOrigin::Fallback)
    }

    pub fn executed_sql(&self) -> Vec<&str> {
        self.queries.iter().map(|query| query.sql.as_str()).collect()
    }

    /// Tool names in invocation order, fallback queries included.
    pub fn tools_used(&self) -> Vec<String> {
        self.tool_invocations.iter().map(|invocation| invocation.tool.clone()).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Concise,
    Detailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    pub text: String,
    pub verbosity: Verbosity,
    pub data_available: bool,
}
