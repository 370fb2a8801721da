//! Material lifecycle: receive, move and remove.
//!
//! Each operation runs as one unit of work:
//!
//! ```text
//! begin
//!   -> read + lock positions (ascending id order)
//!   -> validate quantities
//!   -> adjust the projection
//!   -> post ledger entries (FIFO layers, move propagation)
//! commit  |  rollback on any failure (or when the future is dropped)
//! ```
//!
//! A failed operation leaves no trace and is safe to retry. A succeeded one is not
//! idempotent: running it again moves the material again.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use stockledger_core::{DomainError, PositionId, Quantity};
use stockledger_inventory::{
    IncomingRecord, LedgerBalance, LedgerEntry, MaterialPosition, MaterialType, MoveMaterial,
    NewIncoming, PositionKey, Posting, ReceiveMaterial, RemoveMaterial, reconcile,
};
use stockledger_observability::INTEGRITY_TARGET;

use crate::ledger::CostLayerLedger;
use crate::reporting::{
    self, BalanceReportQuery, BalanceRow, TransactionReportQuery, TransactionRow,
};
use crate::store::{
    IncomingStaging, InventoryStore, MaterialStore, StoreError, StoreResult, UnitOfWork,
};

/// Failure of a lifecycle operation. The unit of work has been rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("requested quantity ({requested}) is more than the available one ({available})")]
    InsufficientQuantity {
        requested: Quantity,
        available: Quantity,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger cannot account for units the projection says exist.
    #[error("no cost layer available for stock {stock_id}: {unallocated} unit(s) unallocated")]
    NoAvailableLayer {
        stock_id: String,
        unallocated: Quantity,
    },

    /// Stored ledger and projection disagree.
    #[error("ledger integrity violated: {0}")]
    Integrity(String),

    /// Transient storage failure or write conflict.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LifecycleError {
    /// Stored data is inconsistent; needs an operator.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            LifecycleError::NoAvailableLayer { .. } | LifecycleError::Integrity(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LifecycleError::StoreUnavailable(_))
    }
}

impl From<DomainError> for LifecycleError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LifecycleError::Validation(msg)
            }
            DomainError::InsufficientQuantity {
                requested,
                available,
            } => LifecycleError::InsufficientQuantity {
                requested,
                available,
            },
            DomainError::NotFound(what) => LifecycleError::NotFound(what),
            DomainError::NoAvailableLayer {
                stock_id,
                unallocated,
            } => LifecycleError::NoAvailableLayer {
                stock_id,
                unallocated,
            },
            DomainError::InvariantViolation(msg) => LifecycleError::Integrity(msg),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(err) => err.into(),
            StoreError::NotFound(what) => LifecycleError::NotFound(what),
            StoreError::Unavailable(msg) | StoreError::Conflict(msg) => {
                LifecycleError::StoreUnavailable(msg)
            }
        }
    }
}

/// Both sides of a completed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub source: MaterialPosition,
    pub destination: MaterialPosition,
}

fn report(operation: &'static str, err: &LifecycleError) {
    if err.is_integrity_violation() {
        error!(target: INTEGRITY_TARGET, operation, error = %err, "ledger integrity violation");
    } else if err.is_retryable() {
        error!(operation, error = %err, "inventory store failure");
    } else {
        warn!(operation, error = %err, "inventory operation rejected");
    }
}

/// Commit on success; otherwise roll back and surface the original failure.
async fn finish<W, T>(operation: &'static str, work: W, result: StoreResult<T>) -> Result<T, LifecycleError>
where
    W: UnitOfWork,
{
    let outcome = match result {
        Ok(value) => work.commit().await.map(|()| value).map_err(LifecycleError::from),
        Err(err) => {
            if let Err(rollback) = work.rollback().await {
                warn!(operation, error = %rollback, "rollback failed; transaction discarded");
            }
            Err(err.into())
        }
    };
    if let Err(err) = &outcome {
        report(operation, err);
    }
    outcome
}

async fn lock_one<W: MaterialStore>(work: &mut W, id: PositionId) -> StoreResult<MaterialPosition> {
    work.lock_positions(&[id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound(format!("material position {id}")))
}

/// Receive, move and remove material against an [`InventoryStore`].
#[derive(Debug, Clone)]
pub struct MaterialLifecycle<S> {
    store: S,
}

impl<S: InventoryStore> MaterialLifecycle<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stage a receipt for a later [`receive`](Self::receive).
    #[instrument(
        skip(self, input),
        fields(stock_id = %input.stock_id, quantity = input.quantity),
        err
    )]
    pub async fn stage(&self, input: NewIncoming) -> Result<IncomingRecord, LifecycleError> {
        input.validate()?;
        let mut work = self.store.begin().await?;
        let result = work.enqueue(input, Utc::now()).await;
        let record = finish("stage", work, result).await?;
        info!(incoming_id = %record.id, "incoming material staged");
        Ok(record)
    }

    /// Put the whole staged quantity of an incoming record away at a location.
    ///
    /// The record is consumed only if everything else succeeds.
    #[instrument(
        skip(self, cmd),
        fields(incoming_id = %cmd.incoming_id, location_id = %cmd.location_id),
        err
    )]
    pub async fn receive(&self, cmd: ReceiveMaterial) -> Result<MaterialPosition, LifecycleError> {
        let mut work = self.store.begin().await?;
        let result = Self::receive_in(&mut work, &cmd).await;
        let position = finish("receive", work, result).await?;
        info!(
            material_id = %position.id,
            quantity = position.quantity,
            "material received"
        );
        Ok(position)
    }

    async fn receive_in(work: &mut S::Work, cmd: &ReceiveMaterial) -> StoreResult<MaterialPosition> {
        let record = work.dequeue(cmd.incoming_id).await?;
        let key = PositionKey {
            stock_id: record.stock_id.clone(),
            location_id: cmd.location_id,
            owner: record.owner.clone(),
        };

        let target = match work.find_position(&key).await? {
            Some(existing) => lock_one(work, existing.id).await?,
            None => {
                work.create_position(record.position_at(cmd.location_id, &cmd.notes), cmd.occurred_at)
                    .await?
            }
        };

        let position = work
            .adjust_quantity(
                target.id,
                record.quantity,
                Some(cmd.notes.as_str()),
                cmd.occurred_at,
            )
            .await?;
        CostLayerLedger::post(
            work,
            Posting {
                position_id: position.id,
                stock_id: record.stock_id.clone(),
                quantity_delta: record.quantity,
                unit_cost: record.unit_cost,
                notes: cmd.notes.clone(),
                job_ticket: None,
                at: cmd.occurred_at,
                move_target: None,
            },
        )
        .await?;
        work.delete(record.id).await?;
        Ok(position)
    }

    /// Move part of a position to another location, carrying its cost layers along.
    #[instrument(
        skip(self, cmd),
        fields(
            material_id = %cmd.position_id,
            location_id = %cmd.location_id,
            quantity = cmd.quantity
        ),
        err
    )]
    pub async fn move_material(&self, cmd: MoveMaterial) -> Result<MoveOutcome, LifecycleError> {
        cmd.validate()?;
        let mut work = self.store.begin().await?;
        let result = Self::move_in(&mut work, &cmd).await;
        let outcome = finish("move", work, result).await?;
        info!(
            from = %outcome.source.id,
            to = %outcome.destination.id,
            "material moved"
        );
        Ok(outcome)
    }

    async fn move_in(work: &mut S::Work, cmd: &MoveMaterial) -> StoreResult<MoveOutcome> {
        let peek = work
            .get_position(cmd.position_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("material position {}", cmd.position_id)))?;
        if peek.location_id == cmd.location_id {
            return Err(DomainError::validation(format!(
                "material {} is already at location {}",
                peek.id, cmd.location_id
            ))
            .into());
        }

        let sibling = peek.relocated(cmd.location_id);
        let existing = work.find_position(&sibling.key()).await?;

        let mut ids = vec![peek.id];
        ids.extend(existing.as_ref().map(|p| p.id));
        let locked = work.lock_positions(&ids).await?;
        let source = locked
            .iter()
            .find(|p| p.id == peek.id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("material position {}", peek.id)))?;

        if cmd.quantity > source.quantity {
            return Err(DomainError::insufficient(cmd.quantity, source.quantity).into());
        }

        let destination = match existing {
            Some(existing) => existing,
            None => {
                debug!(location_id = %cmd.location_id, "creating destination position");
                work.create_position(source.relocated(cmd.location_id), cmd.occurred_at)
                    .await?
            }
        };

        let source = work
            .adjust_quantity(
                source.id,
                -cmd.quantity,
                Some(cmd.notes.as_str()),
                cmd.occurred_at,
            )
            .await?;
        let destination = work
            .adjust_quantity(destination.id, cmd.quantity, None, cmd.occurred_at)
            .await?;

        CostLayerLedger::post(
            work,
            Posting {
                position_id: source.id,
                stock_id: source.stock_id.clone(),
                quantity_delta: -cmd.quantity,
                unit_cost: source.unit_cost,
                notes: cmd.notes.clone(),
                job_ticket: None,
                at: cmd.occurred_at,
                move_target: Some(destination.id),
            },
        )
        .await?;

        Ok(MoveOutcome {
            source,
            destination,
        })
    }

    /// Consume material from a position for a job ticket.
    #[instrument(
        skip(self, cmd),
        fields(
            material_id = %cmd.position_id,
            quantity = cmd.quantity,
            job_ticket = %cmd.job_ticket
        ),
        err
    )]
    pub async fn remove(&self, cmd: RemoveMaterial) -> Result<MaterialPosition, LifecycleError> {
        cmd.validate()?;
        let mut work = self.store.begin().await?;
        let result = Self::remove_in(&mut work, &cmd).await;
        let position = finish("remove", work, result).await?;
        info!(
            material_id = %position.id,
            quantity = position.quantity,
            "material removed"
        );
        Ok(position)
    }

    async fn remove_in(work: &mut S::Work, cmd: &RemoveMaterial) -> StoreResult<MaterialPosition> {
        let position = lock_one(work, cmd.position_id).await?;
        if cmd.quantity > position.quantity {
            return Err(DomainError::insufficient(cmd.quantity, position.quantity).into());
        }

        let notes = cmd.notes.clone().unwrap_or_else(|| position.notes.clone());
        let updated = work
            .adjust_quantity(position.id, -cmd.quantity, None, cmd.occurred_at)
            .await?;
        CostLayerLedger::post(
            work,
            Posting {
                position_id: updated.id,
                stock_id: updated.stock_id.clone(),
                quantity_delta: -cmd.quantity,
                unit_cost: updated.unit_cost,
                notes,
                job_ticket: Some(cmd.job_ticket.clone()),
                at: cmd.occurred_at,
                move_target: None,
            },
        )
        .await?;
        Ok(updated)
    }

    /// Reconcile a position against its ledger.
    #[instrument(skip(self), err)]
    pub async fn audit(&self, position_id: PositionId) -> Result<LedgerBalance, LifecycleError> {
        let position = self
            .store
            .position(position_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("material position {position_id}")))?;
        let entries = self.store.position_entries(position_id).await?;
        reconcile(&position, &entries).map_err(|err| {
            let err = LifecycleError::from(err);
            report("audit", &err);
            err
        })
    }

    pub async fn positions(&self) -> Result<Vec<MaterialPosition>, LifecycleError> {
        Ok(self.store.list_positions().await?)
    }

    pub async fn incoming(&self) -> Result<Vec<IncomingRecord>, LifecycleError> {
        Ok(self.store.list_incoming().await?)
    }

    pub async fn ledger(&self, position_id: PositionId) -> Result<Vec<LedgerEntry>, LifecycleError> {
        if self.store.position(position_id).await?.is_none() {
            return Err(LifecycleError::NotFound(format!(
                "material position {position_id}"
            )));
        }
        Ok(self.store.position_entries(position_id).await?)
    }

    pub fn material_types(&self) -> &'static [MaterialType] {
        &MaterialType::ALL
    }

    pub async fn transaction_report(
        &self,
        query: &TransactionReportQuery,
    ) -> Result<Vec<TransactionRow>, LifecycleError> {
        Ok(reporting::transaction_report(&self.store, query).await?)
    }

    pub async fn balance_report(
        &self,
        query: &BalanceReportQuery,
    ) -> Result<Vec<BalanceRow>, LifecycleError> {
        Ok(reporting::balance_report(&self.store, query).await?)
    }
}
