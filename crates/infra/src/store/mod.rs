//! Inventory storage boundary.
//!
//! Lifecycle code talks to storage through three roles ([`MaterialStore`],
//! [`LedgerStore`], [`IncomingStaging`]) that a [`UnitOfWork`] provides together, so a
//! whole receive, move or remove commits or rolls back as one.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryInventoryStore, InMemoryUnitOfWork, StoreOp};
pub use postgres::{PostgresInventoryStore, PostgresUnitOfWork};
pub use r#trait::{
    IncomingStaging, InventoryStore, LedgerStore, MaterialStore, StoreError, StoreResult,
    UnitOfWork,
};
