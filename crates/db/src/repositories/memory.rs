use std::collections::HashMap;

use tokio::sync::RwLock;

use funnelsight_core::checkpoint::{CheckpointError, CheckpointStore, ThreadCheckpoint};

/// Process-local checkpoints, lost on restart.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, ThreadCheckpoint>>,
}

impl InMemoryCheckpointStore {
    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<ThreadCheckpoint>, CheckpointError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(thread_id).cloned())
    }

    async fn put(&self, checkpoint: ThreadCheckpoint) -> Result<(), CheckpointError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use funnelsight_core::checkpoint::{CheckpointStore, ThreadCheckpoint};
    use funnelsight_core::domain::workflow::WorkflowState;

    use super::InMemoryCheckpointStore;

    #[tokio::test]
    async fn in_memory_checkpoint_round_trip() {
        let store = InMemoryCheckpointStore::default();
        let mut checkpoint = ThreadCheckpoint::new("thread-a");
        checkpoint.record_run(WorkflowState::new("traffic in Chile", Vec::new()), 10);

        store.put(checkpoint.clone()).await.expect("put checkpoint");
        let found = store.get("thread-a").await.expect("get checkpoint");

        assert_eq!(found, Some(checkpoint));
        assert_eq!(store.get("thread-b").await.expect("get missing"), None);
    }

    #[tokio::test]
    async fn put_replaces_the_thread_checkpoint() {
        let store = InMemoryCheckpointStore::default();
        store.put(ThreadCheckpoint::new("thread-a")).await.expect("first put");

        let mut updated = ThreadCheckpoint::new("thread-a");
        updated.record_run(WorkflowState::new("second question", Vec::new()), 10);
        store.put(updated.clone()).await.expect("second put");

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("thread-a").await.expect("get"), Some(updated));
    }
}
