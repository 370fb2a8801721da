use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_core::{DomainError, IncomingId, LedgerEntryId, PositionId, Quantity, StockId};
use stockledger_inventory::{
    IncomingRecord, LayerAmendment, LedgerEntry, MaterialPosition, NewIncoming, NewLedgerEntry,
    NewPosition, PositionKey,
};

use crate::reporting::{LedgerFilter, LedgerLine};

/// Storage failure.
///
/// `Unavailable` and `Conflict` are transient and safe to retry (the unit of work has been
/// rolled back). `Domain` carries a deterministic business failure detected at the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Concurrent writers collided (unique key race, serialization failure, deadlock).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Current-quantity projection, as seen from inside a unit of work.
#[async_trait]
pub trait MaterialStore: Send {
    /// Unlocked read by id.
    async fn get_position(&mut self, id: PositionId) -> StoreResult<Option<MaterialPosition>>;

    /// Unlocked read by natural key.
    async fn find_position(&mut self, key: &PositionKey) -> StoreResult<Option<MaterialPosition>>;

    /// Exclusively lock `ids` for the rest of the unit of work, in ascending id order.
    ///
    /// Returns the locked rows in ascending id order. Fails with `NotFound` if any id is
    /// missing.
    async fn lock_positions(&mut self, ids: &[PositionId]) -> StoreResult<Vec<MaterialPosition>>;

    /// Create a position at quantity 0 and lock it.
    ///
    /// If the key already exists (possibly created concurrently) the existing row is
    /// locked and returned instead.
    async fn create_position(
        &mut self,
        new: NewPosition,
        at: DateTime<Utc>,
    ) -> StoreResult<MaterialPosition>;

    /// Apply a signed delta. Fails with `InsufficientQuantity` if the result would be negative.
    async fn adjust_quantity(
        &mut self,
        id: PositionId,
        delta: Quantity,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<MaterialPosition>;
}

/// Append-only ledger rows of one unit of work.
#[async_trait]
pub trait LedgerStore: Send {
    /// Every entry of (position, stock), ascending by id.
    async fn layer_snapshot(
        &mut self,
        position_id: PositionId,
        stock_id: &StockId,
    ) -> StoreResult<Vec<LedgerEntry>>;

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry>;

    async fn amend_layer(
        &mut self,
        id: LedgerEntryId,
        amendment: LayerAmendment,
    ) -> StoreResult<LedgerEntry>;
}

/// Staged receipts.
#[async_trait]
pub trait IncomingStaging: Send {
    async fn enqueue(&mut self, new: NewIncoming, at: DateTime<Utc>) -> StoreResult<IncomingRecord>;

    /// Read and lock a staged record. `NotFound` if absent or already consumed.
    async fn dequeue(&mut self, id: IncomingId) -> StoreResult<IncomingRecord>;

    async fn delete(&mut self, id: IncomingId) -> StoreResult<()>;
}

/// One atomic unit of work. Dropping it without `commit` rolls everything back.
#[async_trait]
pub trait UnitOfWork: MaterialStore + LedgerStore + IncomingStaging + Send {
    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Inventory storage backend: opens units of work and serves read-only queries.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    type Work: UnitOfWork + 'static;

    async fn begin(&self) -> StoreResult<Self::Work>;

    async fn list_positions(&self) -> StoreResult<Vec<MaterialPosition>>;

    async fn position(&self, id: PositionId) -> StoreResult<Option<MaterialPosition>>;

    async fn list_incoming(&self) -> StoreResult<Vec<IncomingRecord>>;

    /// Ledger of one position, ascending by id.
    async fn position_entries(&self, id: PositionId) -> StoreResult<Vec<LedgerEntry>>;

    /// Ledger entries joined with their position, filtered for reporting.
    async fn ledger_lines(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerLine>>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore,
{
    type Work = S::Work;

    async fn begin(&self) -> StoreResult<Self::Work> {
        (**self).begin().await
    }

    async fn list_positions(&self) -> StoreResult<Vec<MaterialPosition>> {
        (**self).list_positions().await
    }

    async fn position(&self, id: PositionId) -> StoreResult<Option<MaterialPosition>> {
        (**self).position(id).await
    }

    async fn list_incoming(&self) -> StoreResult<Vec<IncomingRecord>> {
        (**self).list_incoming().await
    }

    async fn position_entries(&self, id: PositionId) -> StoreResult<Vec<LedgerEntry>> {
        (**self).position_entries(id).await
    }

    async fn ledger_lines(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerLine>> {
        (**self).ledger_lines(filter).await
    }
}
