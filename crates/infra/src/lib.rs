//! Infrastructure layer: stores, ledger posting, lifecycle orchestration, reports, config.

pub mod config;
pub mod ledger;
pub mod lifecycle;
pub mod reporting;
pub mod store;


pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use lifecycle::{LifecycleError, MaterialLifecycle, MoveOutcome};
pub use store::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore};
