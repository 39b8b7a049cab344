use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WarehouseError {
    #[error("query rejected: {0}")]
    Rejected(String),
    #[error("query execution failed: {0}")]
    Execution(String),
    #[error("query timed out after {0}s")]
    Timeout(u64),
    #[error("could not decode column `{column}`: {message}")]
    Decode { column: String, message: String },
}

/// Tabular result of a read-only query. Cells are JSON scalars.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as `{column: value}` objects, at most `limit` of them.
    pub fn records(&self, limit: usize) -> Vec<Value> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                let record: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(record)
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub description: Option<String>,
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes one statement. Callers are responsible for the read-only check.
    async fn execute(&self, sql: &str) -> Result<QueryRows, WarehouseError>;
}

#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>, WarehouseError>;
}

/// Business meaning of the funnel table columns.
pub fn funnel_column_description(column: &str) -> Option<&'static str> {
    let description = match column {
        "date" => "Calendar day of the funnel snapshot (YYYY-MM-DD).",
        "culture" => "Market code: BR, CL, PE, PY, US, CO, AR, EC, UY.",
        "device" => "Device category: desktop or mobile.",
        "traffic_type" => "Traffic source: Organico, Pagado or Promoted.",
        "traffic" => "Sessions that entered the funnel.",
        "flight_dom_loaded_flight" => "Sessions that loaded the flight selection page.",
        "payment_confirmation_loaded" => "Sessions that reached payment confirmation.",
        "median_time_seconds" => "Median time from entry to payment confirmation, in seconds.",
        "median_time_minutes" => "Median time from entry to payment confirmation, in minutes.",
        _ => return None,
    };
    Some(description)
}
