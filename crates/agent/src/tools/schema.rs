use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use funnelsight_core::domain::analysis::SCHEMA_INFO_TOOL;
use funnelsight_core::warehouse::SchemaIntrospector;

use super::Tool;
use crate::llm::ToolSpec;

/// Describes the columns of the funnel table. Only the configured table can be
/// described, whatever the model asks for.
pub struct SchemaInfoTool {
    introspector: Arc<dyn SchemaIntrospector>,
    table: String,
}

impl SchemaInfoTool {
    pub fn new(introspector: Arc<dyn SchemaIntrospector>, table: impl Into<String>) -> Self {
        Self { introspector, table: table.into() }
    }
}

#[async_trait]
impl Tool for SchemaInfoTool {
    fn name(&self) -> &'static str {
        SCHEMA_INFO_TOOL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: SCHEMA_INFO_TOOL.to_string(),
            description: format!(
                "Get the column names, types and business meaning of the `{}` table.",
                self.table
            ),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let columns = self.introspector.describe(&self.table).await?;
        let described: Vec<Value> = columns
            .iter()
            .map(|column| {
                json!({
                    "name": column.name,
                    "type": column.data_type,
                    "nullable": column.nullable,
                    "description": column.description,
                })
            })
            .collect();

        Ok(json!({
            "table_name": self.table,
            "description": "Daily aggregated funnel data by culture, device and traffic type.",
            "granularity": "One row per date, culture, device and traffic_type combination.",
            "column_count": described.len(),
            "columns": described,
        }))
    }
}
