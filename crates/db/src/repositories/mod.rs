use thiserror::Error;

use funnelsight_core::checkpoint::CheckpointError;

pub mod checkpoint;
pub mod memory;

pub use checkpoint::SqlCheckpointStore;
pub use memory::InMemoryCheckpointStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for CheckpointError {
    fn from(value: RepositoryError) -> Self {
        Self::Storage(value.to_string())
    }
}
