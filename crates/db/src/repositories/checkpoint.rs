use chrono::{DateTime, Utc};
use sqlx::Row;

use funnelsight_core::checkpoint::{CheckpointError, CheckpointStore, ThreadCheckpoint};

use super::RepositoryError;
use crate::DbPool;

/// Thread checkpoints in the `workflow_checkpoint` table, one JSON body per
/// thread.
pub struct SqlCheckpointStore {
    pool: DbPool,
}

impl SqlCheckpointStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Removes checkpoints untouched since `cutoff`. Returns the number removed.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflow_checkpoint WHERE updated_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqlCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ThreadCheckpoint>, CheckpointError> {
        let row = sqlx::query(
            "SELECT checkpoint_json
             FROM workflow_checkpoint
             WHERE thread_id = ?",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let body: String = row
            .try_get("checkpoint_json")
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn put(&self, checkpoint: ThreadCheckpoint) -> Result<(), CheckpointError> {
        let body = serde_json::to_string(&checkpoint)?;
        sqlx::query(
            "INSERT INTO workflow_checkpoint (thread_id, checkpoint_json, query_count, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET
                checkpoint_json = excluded.checkpoint_json,
                query_count = excluded.query_count,
                updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.thread_id)
        .bind(body)
        .bind(checkpoint.executed_queries.len() as i64)
        .bind(checkpoint.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use funnelsight_core::checkpoint::{CheckpointError, CheckpointStore, ThreadCheckpoint};
    use funnelsight_core::domain::analysis::{TechnicalResult, ToolInvocation};
    use funnelsight_core::domain::workflow::WorkflowState;

    use super::SqlCheckpointStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlCheckpointStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlCheckpointStore::new(pool)
    }

    fn answered_state(sql: &str) -> WorkflowState {
        let mut state = WorkflowState::new("traffic Chile august", Vec::new());
        let mut result = TechnicalResult::default();
        result.tool_invocations.push(ToolInvocation::succeeded(
            "sql_query",
            json!({ "query": sql }),
            json!({ "rows_returned": 3 }),
        ));
        state.set_technical_result(result).expect("technical result");
        state.set_final_response("Chile had 12,000 sessions.").expect("final response");
        state
    }

    #[tokio::test]
    async fn sql_checkpoint_round_trip_and_upsert() {
        let store = store().await;
        assert_eq!(store.get("thread-1").await.expect("get empty"), None);

        let mut checkpoint = ThreadCheckpoint::new("thread-1");
        checkpoint.record_run(answered_state("SELECT 1 FROM funnels_resumido"), 5);
        store.put(checkpoint.clone()).await.expect("put");
        assert_eq!(store.get("thread-1").await.expect("get"), Some(checkpoint.clone()));

        checkpoint.record_run(answered_state("SELECT 2 FROM funnels_resumido"), 5);
        store.put(checkpoint.clone()).await.expect("upsert");
        let reloaded = store.get("thread-1").await.expect("get").expect("checkpoint exists");
        assert_eq!(reloaded.executed_queries.len(), 2);
        assert_eq!(reloaded, checkpoint);
    }

    #[tokio::test]
    async fn corrupted_bodies_surface_as_serialization_errors() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO workflow_checkpoint (thread_id, checkpoint_json, updated_at)
             VALUES ('broken', '{not json', '2025-08-01T00:00:00Z')",
        )
        .execute(&store.pool)
        .await
        .expect("insert corrupted row");

        assert!(matches!(store.get("broken").await, Err(CheckpointError::Serialization(_))));
    }

    #[tokio::test]
    async fn prune_removes_stale_threads_only() {
        let store = store().await;
        let mut stale = ThreadCheckpoint::new("stale");
        stale.updated_at = Utc::now() - Duration::days(30);
        store.put(stale).await.expect("put stale");
        store.put(ThreadCheckpoint::new("fresh")).await.expect("put fresh");

        let removed =
            store.prune_older_than(Utc::now() - Duration::days(7)).await.expect("prune");

        assert_eq!(removed, 1);
        assert!(store.get("stale").await.expect("get stale").is_none());
        assert!(store.get("fresh").await.expect("get fresh").is_some());
    }
}
