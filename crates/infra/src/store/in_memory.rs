use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_core::{
    Entity, IncomingId, LedgerEntryId, PositionId, Quantity, StockId,
};
use stockledger_inventory::{
    IncomingRecord, LayerAmendment, LedgerEntry, MaterialPosition, NewIncoming, NewLedgerEntry,
    NewPosition, PositionKey,
};

use super::r#trait::{
    IncomingStaging, InventoryStore, LedgerStore, MaterialStore, StoreError, StoreResult,
    UnitOfWork,
};
use crate::reporting::{LedgerFilter, LedgerLine};

/// Store operations that a test can make fail with [`InMemoryInventoryStore::fail_next`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Begin,
    GetPosition,
    FindPosition,
    LockPositions,
    CreatePosition,
    AdjustQuantity,
    LayerSnapshot,
    InsertEntry,
    AmendLayer,
    Enqueue,
    Dequeue,
    Delete,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    positions: BTreeMap<PositionId, MaterialPosition>,
    entries: BTreeMap<LedgerEntryId, LedgerEntry>,
    incoming: BTreeMap<IncomingId, IncomingRecord>,
    last_position: i64,
    last_entry: i64,
    last_incoming: i64,
}

impl Tables {
    fn ledger_lines(&self, filter: &LedgerFilter) -> Vec<LedgerLine> {
        self.entries
            .values()
            .filter_map(|entry| {
                let position = self.positions.get(&entry.position_id)?;
                Some(LedgerLine {
                    entry: entry.clone(),
                    customer_id: position.customer_id,
                    location_id: position.location_id,
                    material_type: position.material_type,
                })
            })
            .filter(|line| filter.matches(line))
            .collect()
    }
}

fn require<'a, E: Entity>(table: &'a BTreeMap<E::Id, E>, id: E::Id) -> StoreResult<&'a E> {
    table
        .get(&id)
        .ok_or_else(|| StoreError::NotFound(format!("{} {}", E::KIND, id)))
}

fn require_mut<'a, E: Entity>(
    table: &'a mut BTreeMap<E::Id, E>,
    id: E::Id,
) -> StoreResult<&'a mut E> {
    table
        .get_mut(&id)
        .ok_or_else(|| StoreError::NotFound(format!("{} {}", E::KIND, id)))
}

#[derive(Debug, Default)]
struct FaultPlan {
    /// Armed faults: the op and how many calls of it still succeed first.
    armed: StdMutex<Vec<(StoreOp, usize)>>,
}

impl FaultPlan {
    fn arm(&self, op: StoreOp, skip: usize) {
        if let Ok(mut armed) = self.armed.lock() {
            armed.push((op, skip));
        }
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        let mut armed = self
            .armed
            .lock()
            .map_err(|_| StoreError::Unavailable("fault plan lock poisoned".to_string()))?;
        let Some(idx) = armed.iter().position(|(armed_op, _)| *armed_op == op) else {
            return Ok(());
        };
        if armed[idx].1 > 0 {
            armed[idx].1 -= 1;
            return Ok(());
        }
        armed.remove(idx);
        Err(StoreError::Unavailable(format!("injected failure at {op:?}")))
    }
}

/// In-memory inventory store.
///
/// Intended for tests/dev. Units of work are fully serialized: `begin` takes an owned
/// async lock on the whole store and works on a private copy that `commit` swaps in.
/// Dropping the unit of work (or its future) discards the copy.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<FaultPlan>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, op: StoreOp) {
        self.faults.arm(op, 0);
    }

    /// Let `calls` calls of `op` succeed, then fail the one after.
    pub fn fail_after(&self, op: StoreOp, calls: usize) {
        self.faults.arm(op, calls);
    }
}

/// Unit of work over [`InMemoryInventoryStore`].
pub struct InMemoryUnitOfWork {
    committed: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<FaultPlan>,
}

impl core::fmt::Debug for InMemoryUnitOfWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryUnitOfWork")
            .field("positions", &self.working.positions.len())
            .field("entries", &self.working.entries.len())
            .finish()
    }
}

#[async_trait]
impl MaterialStore for InMemoryUnitOfWork {
    async fn get_position(&mut self, id: PositionId) -> StoreResult<Option<MaterialPosition>> {
        self.faults.check(StoreOp::GetPosition)?;
        Ok(self.working.positions.get(&id).cloned())
    }

    async fn find_position(&mut self, key: &PositionKey) -> StoreResult<Option<MaterialPosition>> {
        self.faults.check(StoreOp::FindPosition)?;
        Ok(self
            .working
            .positions
            .values()
            .find(|p| &p.key() == key)
            .cloned())
    }

    async fn lock_positions(&mut self, ids: &[PositionId]) -> StoreResult<Vec<MaterialPosition>> {
        self.faults.check(StoreOp::LockPositions)?;
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        ids.into_iter()
            .map(|id| require(&self.working.positions, id).cloned())
            .collect()
    }

    async fn create_position(
        &mut self,
        new: NewPosition,
        at: DateTime<Utc>,
    ) -> StoreResult<MaterialPosition> {
        self.faults.check(StoreOp::CreatePosition)?;
        let key = new.key();
        if let Some(existing) = self.working.positions.values().find(|p| p.key() == key) {
            return Ok(existing.clone());
        }
        self.working.last_position += 1;
        let id = PositionId::new(self.working.last_position);
        let position = new.into_position(id, at);
        self.working.positions.insert(id, position.clone());
        Ok(position)
    }

    async fn adjust_quantity(
        &mut self,
        id: PositionId,
        delta: Quantity,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<MaterialPosition> {
        self.faults.check(StoreOp::AdjustQuantity)?;
        let position = require_mut(&mut self.working.positions, id)?;
        position.apply_delta(delta, notes, at)?;
        Ok(position.clone())
    }
}

#[async_trait]
impl LedgerStore for InMemoryUnitOfWork {
    async fn layer_snapshot(
        &mut self,
        position_id: PositionId,
        stock_id: &StockId,
    ) -> StoreResult<Vec<LedgerEntry>> {
        self.faults.check(StoreOp::LayerSnapshot)?;
        Ok(self
            .working
            .entries
            .values()
            .filter(|e| e.position_id == position_id && &e.stock_id == stock_id)
            .cloned()
            .collect())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        self.faults.check(StoreOp::InsertEntry)?;
        require(&self.working.positions, entry.position_id)?;
        self.working.last_entry += 1;
        let id = LedgerEntryId::new(self.working.last_entry);
        let entry = entry.into_entry(id);
        self.working.entries.insert(id, entry.clone());
        Ok(entry)
    }

    async fn amend_layer(
        &mut self,
        id: LedgerEntryId,
        amendment: LayerAmendment,
    ) -> StoreResult<LedgerEntry> {
        self.faults.check(StoreOp::AmendLayer)?;
        let layer = require_mut(&mut self.working.entries, id)?;
        amendment.apply(layer)?;
        Ok(layer.clone())
    }
}

#[async_trait]
impl IncomingStaging for InMemoryUnitOfWork {
    async fn enqueue(&mut self, new: NewIncoming, at: DateTime<Utc>) -> StoreResult<IncomingRecord> {
        self.faults.check(StoreOp::Enqueue)?;
        new.validate()?;
        self.working.last_incoming += 1;
        let id = IncomingId::new(self.working.last_incoming);
        let record = new.into_record(id, at);
        self.working.incoming.insert(id, record.clone());
        Ok(record)
    }

    async fn dequeue(&mut self, id: IncomingId) -> StoreResult<IncomingRecord> {
        self.faults.check(StoreOp::Dequeue)?;
        require(&self.working.incoming, id).cloned()
    }

    async fn delete(&mut self, id: IncomingId) -> StoreResult<()> {
        self.faults.check(StoreOp::Delete)?;
        self.working
            .incoming
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", IncomingRecord::KIND, id)))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(mut self) -> StoreResult<()> {
        self.faults.check(StoreOp::Commit)?;
        *self.committed = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Work = InMemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<InMemoryUnitOfWork> {
        self.faults.check(StoreOp::Begin)?;
        let committed = Arc::clone(&self.tables).lock_owned().await;
        let working = committed.clone();
        Ok(InMemoryUnitOfWork {
            committed,
            working,
            faults: Arc::clone(&self.faults),
        })
    }

    async fn list_positions(&self) -> StoreResult<Vec<MaterialPosition>> {
        Ok(self.tables.lock().await.positions.values().cloned().collect())
    }

    async fn position(&self, id: PositionId) -> StoreResult<Option<MaterialPosition>> {
        Ok(self.tables.lock().await.positions.get(&id).cloned())
    }

    async fn list_incoming(&self) -> StoreResult<Vec<IncomingRecord>> {
        Ok(self.tables.lock().await.incoming.values().cloned().collect())
    }

    async fn position_entries(&self, id: PositionId) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .tables
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.position_id == id)
            .cloned()
            .collect())
    }

    async fn ledger_lines(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerLine>> {
        Ok(self.tables.lock().await.ledger_lines(filter))
    }
}
