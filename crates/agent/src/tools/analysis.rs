use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use funnelsight_core::domain::analysis::DATA_ANALYSIS_TOOL;

use super::Tool;
use crate::llm::ToolSpec;

/// Categorical columns with more distinct values than this are not compared.
const MAX_COMPARISON_GROUPS: usize = 10;
const TOP_VALUES: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisKind {
    Summary,
    Trends,
    Comparison,
}

impl AnalysisKind {
    /// Unknown names fall back to a summary.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "trends" | "trend" | "time_series" => Self::Trends,
            "comparison" | "compare" => Self::Comparison,
            _ => Self::Summary,
        }
    }
}

/// Statistics over records returned by `sql_query`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataAnalysisTool;

#[async_trait]
impl Tool for DataAnalysisTool {
    fn name(&self) -> &'static str {
        DATA_ANALYSIS_TOOL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: DATA_ANALYSIS_TOOL.to_string(),
            description: "Perform statistical analysis on the output of sql_query: totals, \
                          averages, growth between first and last day, or per-segment \
                          comparisons."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "data": {
                        "type": "string",
                        "description": "The JSON output of a previous sql_query call"
                    },
                    "analysis_type": {
                        "type": "string",
                        "enum": ["summary", "trends", "comparison"],
                        "description": "Type of analysis to perform"
                    }
                },
                "required": ["data", "analysis_type"]
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let analysis_type =
            input.get("analysis_type").and_then(Value::as_str).unwrap_or("summary").to_string();
        let data = match input.get("data") {
            Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
                .map_err(|error| anyhow!("`data` is not valid JSON: {error}"))?,
            Some(value) => value.clone(),
            None => bail!("data_analysis requires a `data` argument"),
        };

        if data.get("success").and_then(Value::as_bool) == Some(false) {
            bail!("cannot analyze failed query results");
        }
        let records = records_of(&data)?;
        if records.is_empty() {
            return Ok(json!({
                "success": true,
                "analysis_type": analysis_type,
                "rows_analyzed": 0,
                "message": "No data to analyze",
                "analysis": {},
            }));
        }

        let frame = Frame::new(records);
        let analysis = match AnalysisKind::parse(&analysis_type) {
            AnalysisKind::Summary => frame.summary(),
            AnalysisKind::Trends => frame.trends(),
            AnalysisKind::Comparison => frame.comparison(),
        };

        Ok(json!({
            "success": true,
            "analysis_type": analysis_type,
            "rows_analyzed": frame.records.len(),
            "analysis": analysis,
        }))
    }
}

/// Accepts either a full `sql_query` output or a bare array of records.
fn records_of(data: &Value) -> Result<Vec<Map<String, Value>>> {
    let records = match data {
        Value::Array(records) => records,
        Value::Object(object) => object
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("`data` has no record array"))?,
        _ => bail!("`data` must be a query output or an array of records"),
    };
    Ok(records.iter().filter_map(Value::as_object).cloned().collect())
}

struct Frame {
    records: Vec<Map<String, Value>>,
    columns: Vec<String>,
}

impl Frame {
    fn new(records: Vec<Map<String, Value>>) -> Self {
        let mut columns = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { records, columns }
    }

    fn non_null<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records.iter().filter_map(move |record| record.get(column)).filter(|v| !v.is_null())
    }

    fn is_numeric(&self, column: &str) -> bool {
        let mut values = self.non_null(column).peekable();
        values.peek().is_some() && values.all(Value::is_number)
    }

    fn is_categorical(&self, column: &str) -> bool {
        let mut values = self.non_null(column).peekable();
        values.peek().is_some() && values.all(Value::is_string)
    }

    fn numeric_columns(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).filter(|c| self.is_numeric(c)).collect()
    }

    fn categorical_columns(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).filter(|c| self.is_categorical(c)).collect()
    }

    fn numbers(&self, column: &str) -> Vec<f64> {
        self.non_null(column).filter_map(Value::as_f64).collect()
    }

    fn summary(&self) -> Value {
        let mut summary = Map::new();

        let numeric: Map<String, Value> = self
            .numeric_columns()
            .into_iter()
            .map(|column| (column.to_string(), stats(&self.numbers(column))))
            .collect();
        if !numeric.is_empty() {
            summary.insert("numeric_summary".to_string(), Value::Object(numeric));
        }

        let categorical: Map<String, Value> = self
            .categorical_columns()
            .into_iter()
            .map(|column| {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for value in self.non_null(column).filter_map(Value::as_str) {
                    *counts.entry(value).or_default() += 1;
                }
                let unique_values = counts.len();
                let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
                let top_values: Vec<Value> = ranked
                    .into_iter()
                    .take(TOP_VALUES)
                    .map(|(value, count)| json!({ "value": value, "count": count }))
                    .collect();
                (
                    column.to_string(),
                    json!({ "unique_values": unique_values, "top_values": top_values }),
                )
            })
            .collect();
        if !categorical.is_empty() {
            summary.insert("categorical_summary".to_string(), Value::Object(categorical));
        }

        Value::Object(summary)
    }

    /// Growth between the earliest and latest row of each numeric column.
    fn trends(&self) -> Value {
        let Some(date_column) = self.date_column() else {
            return json!({});
        };
        if self.records.len() < 2 {
            return json!({});
        }

        let mut ordered: Vec<&Map<String, Value>> = self.records.iter().collect();
        ordered.sort_by_key(|record| record.get(date_column).and_then(parse_day));

        let mut trends = Map::new();
        for column in self.numeric_columns() {
            let first = ordered.first().and_then(|record| record.get(column)?.as_f64());
            let last = ordered.last().and_then(|record| record.get(column)?.as_f64());
            let (Some(first), Some(last)) = (first, last) else {
                continue;
            };
            let growth = if first != 0.0 { (last - first) / first * 100.0 } else { 0.0 };
            let direction = if growth > 0.0 {
                "increasing"
            } else if growth < 0.0 {
                "decreasing"
            } else {
                "stable"
            };
            trends.insert(
                column.to_string(),
                json!({
                    "first_value": first,
                    "last_value": last,
                    "growth_rate_percent": round2(growth),
                    "trend": direction,
                }),
            );
        }
        Value::Object(trends)
    }

    fn date_column(&self) -> Option<&str> {
        self.columns.iter().map(String::as_str).find(|column| {
            let lowered = column.to_ascii_lowercase();
            (lowered.contains("date") || lowered.contains("time") || lowered == "day")
                && self.is_categorical(column)
                && self.non_null(column).all(|value| parse_day(value).is_some())
        })
    }

    fn comparison(&self) -> Value {
        let numeric = self.numeric_columns();
        let mut comparisons = Map::new();

        for group_column in self.categorical_columns() {
            let groups: BTreeSet<&str> =
                self.non_null(group_column).filter_map(Value::as_str).collect();
            if groups.len() > MAX_COMPARISON_GROUPS {
                continue;
            }

            let mut per_metric = Map::new();
            for metric in &numeric {
                let mut buckets: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
                for record in &self.records {
                    let (Some(group), Some(value)) = (
                        record.get(group_column).and_then(Value::as_str),
                        record.get(*metric).and_then(Value::as_f64),
                    ) else {
                        continue;
                    };
                    buckets.entry(group).or_default().push(value);
                }
                let stats: Map<String, Value> = buckets
                    .into_iter()
                    .map(|(group, values)| {
                        let total: f64 = values.iter().sum();
                        (
                            group.to_string(),
                            json!({
                                "total": total,
                                "average": round2(total / values.len() as f64),
                                "count": values.len(),
                            }),
                        )
                    })
                    .collect();
                per_metric.insert(metric.to_string(), Value::Object(stats));
            }
            comparisons.insert(group_column.to_string(), Value::Object(per_metric));
        }

        Value::Object(comparisons)
    }
}

fn stats(values: &[f64]) -> Value {
    let total: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    json!({
        "total": total,
        "average": round2(total / values.len().max(1) as f64),
        "min": min,
        "max": max,
        "count": values.len(),
    })
}

fn parse_day(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?;
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
