use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use funnelsight_core::warehouse::{
    funnel_column_description, ColumnInfo, QueryExecutor, QueryRows, SchemaIntrospector,
    WarehouseError,
};

use crate::DbPool;

/// Read-side adapter over the funnel warehouse. Statements are executed
/// verbatim; the read-only check happens before they reach this type.
#[derive(Clone)]
pub struct SqlWarehouse {
    pool: DbPool,
    timeout_secs: u64,
}

impl SqlWarehouse {
    pub fn new(pool: DbPool, timeout_secs: u64) -> Self {
        Self { pool, timeout_secs: timeout_secs.max(1) }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for SqlWarehouse {
    async fn execute(&self, sql: &str) -> Result<QueryRows, WarehouseError> {
        let fetch = sqlx::query(sql).fetch_all(&self.pool);
        let rows = tokio::time::timeout(Duration::from_secs(self.timeout_secs), fetch)
            .await
            .map_err(|_| WarehouseError::Timeout(self.timeout_secs))?
            .map_err(|error| WarehouseError::Execution(error.to_string()))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|column| column.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

        debug!(
            event_name = "warehouse.query_executed",
            row_count = rows.len(),
            "warehouse query executed"
        );
        Ok(QueryRows { columns, rows })
    }
}

#[async_trait]
impl SchemaIntrospector for SqlWarehouse {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnInfo>, WarehouseError> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(WarehouseError::Rejected(format!("`{table}` is not a table identifier")));
        }

        let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| WarehouseError::Execution(error.to_string()))?;
        if rows.is_empty() {
            return Err(WarehouseError::Execution(format!("table `{table}` does not exist")));
        }

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(|error| decode_error("name", error))?;
                let data_type: String =
                    row.try_get("type").map_err(|error| decode_error("type", error))?;
                let not_null: i64 =
                    row.try_get("notnull").map_err(|error| decode_error("notnull", error))?;
                let description = funnel_column_description(&name).map(str::to_string);
                Ok(ColumnInfo { name, data_type, nullable: not_null == 0, description })
            })
            .collect()
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Value>, WarehouseError> {
    (0..row.columns().len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<Value, WarehouseError> {
    let column = row.columns().get(index).map(|column| column.name().to_string());
    let column = column.unwrap_or_else(|| index.to_string());

    let raw = row.try_get_raw(index).map_err(|error| decode_error(&column, error))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "INT8" | "BOOLEAN" => {
            let value: i64 = row.try_get(index).map_err(|error| decode_error(&column, error))?;
            Value::from(value)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            let value: f64 = row.try_get(index).map_err(|error| decode_error(&column, error))?;
            Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
        }
        "BLOB" => {
            let value: Vec<u8> =
                row.try_get(index).map_err(|error| decode_error(&column, error))?;
            Value::from(format!("<{} bytes>", value.len()))
        }
        _ => {
            let value: String = row.try_get(index).map_err(|error| decode_error(&column, error))?;
            Value::from(value)
        }
    };
    Ok(value)
}

fn decode_error(column: &str, error: sqlx::Error) -> WarehouseError {
    WarehouseError::Decode { column: column.to_string(), message: error.to_string() }
}
