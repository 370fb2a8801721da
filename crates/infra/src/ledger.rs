//! Cost-layer ledger posting.
//!
//! Applies the pure plans from `stockledger_inventory::layer` through a [`LedgerStore`].
//! Must run inside the unit of work that holds the lock on the posted position.

use tracing::debug;

use stockledger_inventory::{LayerAmendment, LedgerEntry, Posting, ReceiptPlan, plan_issue, plan_receipt};

use crate::store::{LedgerStore, StoreResult};

/// Rows written by one posting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingOutcome {
    /// Inserted or merged rows on the posted position.
    pub entries: Vec<LedgerEntry>,
    /// Inserted or merged rows on the move target.
    pub transferred: Vec<LedgerEntry>,
}

pub struct CostLayerLedger;

impl CostLayerLedger {
    /// Record `posting`.
    ///
    /// Receipts merge into the same-cost layer or open a new one. Issues are attributed
    /// to layers FIFO, one negative row per layer drawn; with a move target every draw is
    /// mirrored as a receipt at the target at the drawn layer's cost.
    pub async fn post<L>(ledger: &mut L, posting: Posting) -> StoreResult<PostingOutcome>
    where
        L: LedgerStore,
    {
        posting.validate()?;

        if posting.quantity_delta > 0 {
            let entry = Self::receive(ledger, &posting).await?;
            return Ok(PostingOutcome {
                entries: vec![entry],
                transferred: Vec::new(),
            });
        }

        let snapshot = ledger
            .layer_snapshot(posting.position_id, &posting.stock_id)
            .await?;
        let draws = plan_issue(&snapshot, &posting.stock_id, -posting.quantity_delta)?;

        let mut outcome = PostingOutcome::default();
        let mut receipts = Vec::new();
        for draw in &draws {
            ledger.amend_layer(draw.layer_id, draw.amendment()).await?;
            outcome
                .entries
                .push(ledger.insert_entry(posting.deduction(draw)).await?);
            if let Some(receipt) = posting.mirrored_receipt(draw) {
                receipts.push(receipt);
            }
        }

        for receipt in receipts {
            debug!(
                from = %posting.position_id,
                to = %receipt.position_id,
                quantity = receipt.quantity_delta,
                unit_cost = %receipt.unit_cost,
                "transferring cost layer"
            );
            outcome
                .transferred
                .push(Self::receive(ledger, &receipt).await?);
        }

        Ok(outcome)
    }

    async fn receive<L>(ledger: &mut L, posting: &Posting) -> StoreResult<LedgerEntry>
    where
        L: LedgerStore,
    {
        let snapshot = ledger
            .layer_snapshot(posting.position_id, &posting.stock_id)
            .await?;
        match plan_receipt(&snapshot, &posting.stock_id, posting.unit_cost) {
            ReceiptPlan::Merge { layer_id } => {
                ledger
                    .amend_layer(
                        layer_id,
                        LayerAmendment::Merge {
                            quantity: posting.quantity_delta,
                            at: posting.at,
                        },
                    )
                    .await
            }
            ReceiptPlan::Append => ledger.insert_entry(posting.new_layer()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockledger_core::{CustomerId, DomainError, LocationId, PositionId, Quantity, StockId, UnitCost};
    use stockledger_inventory::{MaterialType, NewPosition, ReorderThresholds};

    use crate::store::{InMemoryInventoryStore, InventoryStore, MaterialStore, StoreError, StoreOp};

    fn stock() -> StockId {
        StockId::new("CARD-100").unwrap()
    }

    fn at(location: i64) -> NewPosition {
        NewPosition {
            stock_id: stock(),
            location_id: LocationId::new(location),
            customer_id: CustomerId::new(1),
            owner: "acme".into(),
            material_type: MaterialType::Card,
            description: String::new(),
            notes: String::new(),
            unit_cost: dec!(1),
            thresholds: ReorderThresholds::default(),
            is_active: true,
        }
    }

    fn posting(position: PositionId, delta: Quantity, cost: UnitCost) -> Posting {
        Posting {
            position_id: position,
            stock_id: stock(),
            quantity_delta: delta,
            unit_cost: cost,
            notes: "test".into(),
            job_ticket: None,
            at: Utc::now(),
            move_target: None,
        }
    }

    #[tokio::test]
    async fn issue_writes_one_row_per_layer_drawn() {
        let store = InMemoryInventoryStore::new();
        let mut work = store.begin().await.unwrap();
        let a = work.create_position(at(1), Utc::now()).await.unwrap();

        CostLayerLedger::post(&mut work, posting(a.id, 10, dec!(1))).await.unwrap();
        CostLayerLedger::post(&mut work, posting(a.id, 5, dec!(2))).await.unwrap();
        let outcome = CostLayerLedger::post(&mut work, posting(a.id, -12, dec!(0)))
            .await
            .unwrap();

        let drawn: Vec<_> = outcome
            .entries
            .iter()
            .map(|e| (e.quantity_change, e.unit_cost, e.remaining_quantity))
            .collect();
        assert_eq!(drawn, vec![(-10, dec!(1), 0), (-2, dec!(2), 3)]);
        assert!(outcome.transferred.is_empty());
    }

    #[tokio::test]
    async fn move_mirrors_every_draw_at_the_target() {
        let store = InMemoryInventoryStore::new();
        let mut work = store.begin().await.unwrap();
        let a = work.create_position(at(1), Utc::now()).await.unwrap();
        let b = work.create_position(at(2), Utc::now()).await.unwrap();

        CostLayerLedger::post(&mut work, posting(a.id, 10, dec!(1))).await.unwrap();
        CostLayerLedger::post(&mut work, posting(a.id, 5, dec!(2))).await.unwrap();
        let mut moving = posting(a.id, -12, dec!(0));
        moving.move_target = Some(b.id);
        let outcome = CostLayerLedger::post(&mut work, moving).await.unwrap();

        let received: Vec<_> = outcome
            .transferred
            .iter()
            .map(|e| (e.position_id, e.quantity_change, e.unit_cost))
            .collect();
        assert_eq!(received, vec![(b.id, 10, dec!(1)), (b.id, 2, dec!(2))]);
    }

    #[tokio::test]
    async fn layer_lookup_failure_is_not_treated_as_missing_layer() {
        let store = InMemoryInventoryStore::new();
        let mut work = store.begin().await.unwrap();
        let a = work.create_position(at(1), Utc::now()).await.unwrap();
        CostLayerLedger::post(&mut work, posting(a.id, 10, dec!(1))).await.unwrap();

        store.fail_next(StoreOp::LayerSnapshot);
        let err = CostLayerLedger::post(&mut work, posting(a.id, -1, dec!(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn issue_without_layers_fails_with_no_available_layer() {
        let store = InMemoryInventoryStore::new();
        let mut work = store.begin().await.unwrap();
        let a = work.create_position(at(1), Utc::now()).await.unwrap();

        let err = CostLayerLedger::post(&mut work, posting(a.id, -1, dec!(0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::NoAvailableLayer { unallocated: 1, .. })
        ));
    }
}
