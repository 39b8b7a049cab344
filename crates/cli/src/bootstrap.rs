use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use funnelsight_agent::{AnalysisOrchestrator, LlmClient, LlmError, OpenAiCompatibleClient};
use funnelsight_core::checkpoint::CheckpointStore;
use funnelsight_core::config::{AppConfig, CheckpointBackend};
use funnelsight_db::{
    connect_with_settings, migrations, DbPool, InMemoryCheckpointStore, SqlCheckpointStore,
    SqlWarehouse,
};

pub struct Application {
    pub config: AppConfig,
    pub pool: DbPool,
    pub orchestrator: AnalysisOrchestrator,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("reasoning client setup failed: {0}")]
    Reasoning(#[source] LlmError),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::Reasoning(_) => "runtime_init",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DatabaseConnect(_) => 4,
            Self::Migration(_) => 5,
            Self::Reasoning(_) => 3,
        }
    }
}

/// Connects to the configured warehouse. In-memory databases are private to a
/// connection, so their pool is pinned to a single connection.
pub async fn connect_warehouse(config: &AppConfig) -> Result<DbPool, sqlx::Error> {
    let url = config.warehouse.url.trim();
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let max_connections = if in_memory { 1 } else { config.warehouse.max_connections };
    connect_with_settings(url, max_connections, config.warehouse.timeout_secs).await
}

pub async fn bootstrap_with_config(
    config: AppConfig,
    reference_date: Option<NaiveDate>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let pool = connect_warehouse(&config).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "warehouse connected and migrations applied"
    );

    let llm =
        OpenAiCompatibleClient::from_config(&config.llm).map_err(BootstrapError::Reasoning)?;
    let orchestrator = build_orchestrator(&config, pool.clone(), Arc::new(llm), reference_date);

    Ok(Application { config, pool, orchestrator })
}

/// Wires the warehouse, checkpoint backend and reasoning client into an
/// orchestrator.
pub fn build_orchestrator(
    config: &AppConfig,
    pool: DbPool,
    llm: Arc<dyn LlmClient>,
    reference_date: Option<NaiveDate>,
) -> AnalysisOrchestrator {
    let warehouse = Arc::new(SqlWarehouse::new(pool.clone(), config.warehouse.timeout_secs));
    let mut orchestrator = AnalysisOrchestrator::new(llm, warehouse.clone(), warehouse, config);
    if let Some(store) = checkpoint_store(config.workflow.checkpoint_backend, &pool) {
        orchestrator = orchestrator.with_checkpoints(store);
    }
    if let Some(reference_date) = reference_date {
        orchestrator = orchestrator.with_reference_date(reference_date);
    }
    orchestrator
}

pub fn checkpoint_store(
    backend: CheckpointBackend,
    pool: &DbPool,
) -> Option<Arc<dyn CheckpointStore>> {
    match backend {
        CheckpointBackend::Disabled => None,
        CheckpointBackend::Memory => Some(Arc::new(InMemoryCheckpointStore::default())),
        CheckpointBackend::Sqlite => Some(Arc::new(SqlCheckpointStore::new(pool.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use funnelsight_core::config::{AppConfig, CheckpointBackend, LlmProvider};

    use super::{bootstrap_with_config, checkpoint_store, connect_warehouse};

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.warehouse.url = "sqlite::memory:".to_string();
        config
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_binds_the_warehouse_tools() {
        let reference_date = NaiveDate::from_ymd_opt(2025, 9, 1).expect("date");
        let app = bootstrap_with_config(memory_config(), Some(reference_date))
            .await
            .expect("bootstrap should succeed against an in-memory warehouse");

        assert_eq!(
            app.orchestrator.tool_names(),
            vec!["data_analysis", "get_schema_info", "sql_query"]
        );
        assert_eq!(app.orchestrator.reference_date(), reference_date);

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('funnels_resumido', 'workflow_checkpoint')",
        )
        .fetch_one(&app.pool)
        .await
        .expect("table count");
        assert_eq!(tables, 2);
    }

    #[tokio::test]
    async fn openai_without_key_fails_before_any_request() {
        let mut config = memory_config();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;

        let error = bootstrap_with_config(config, None).await.err().expect("bootstrap error");
        assert_eq!(error.error_class(), "runtime_init");
        assert_eq!(error.exit_code(), 3);
    }

    #[tokio::test]
    async fn checkpoint_backends_follow_config() {
        let pool = connect_warehouse(&memory_config()).await.expect("connect");
        assert!(checkpoint_store(CheckpointBackend::Disabled, &pool).is_none());
        assert!(checkpoint_store(CheckpointBackend::Memory, &pool).is_some());
        assert!(checkpoint_store(CheckpointBackend::Sqlite, &pool).is_some());
    }
}
