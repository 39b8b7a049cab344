use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use funnelsight_core::config::WarehouseConfig;
use funnelsight_core::warehouse::{QueryExecutor, SchemaIntrospector};

use crate::guardrails::QueryGuard;
use crate::llm::ToolSpec;

pub mod analysis;
pub mod schema;
pub mod sql;

pub use analysis::DataAnalysisTool;
pub use schema::SchemaInfoTool;
pub use sql::{outcome_from_output, SqlQueryTool};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// Tools bound to the data agent, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The three warehouse tools bound to the data agent.
    pub fn for_warehouse(
        executor: Arc<dyn QueryExecutor>,
        introspector: Arc<dyn SchemaIntrospector>,
        warehouse: &WarehouseConfig,
    ) -> Self {
        let mut registry = Self::default();
        registry.register(SqlQueryTool::new(
            executor,
            QueryGuard::new(warehouse.table.clone()),
            warehouse.max_rows,
        ));
        registry.register(DataAnalysisTool);
        registry.register(SchemaInfoTool::new(introspector, warehouse.table.clone()));
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|tool| tool.spec()).collect()
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| anyhow!("unknown tool `{name}`"))?;
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Tool, ToolRegistry};
    use crate::llm::ToolSpec;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                parameters: json!({ "type": "object" }),
            }
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.specs()[0].name, "echo");
        assert_eq!(registry.execute("echo", json!({"a": 1})).await.expect("echo"), json!({"a": 1}));
        assert!(registry.execute("missing", json!({})).await.is_err());
    }
}
