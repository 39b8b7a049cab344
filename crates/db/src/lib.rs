pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod warehouse;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use fixtures::{FunnelRow, FunnelSeedDataset, SeedResult, VerificationResult};
pub use repositories::{InMemoryCheckpointStore, RepositoryError, SqlCheckpointStore};
pub use warehouse::SqlWarehouse;
