//! Cost layers and FIFO allocation.
//!
//! Every movement of a position is a [`LedgerEntry`]. Positive entries are cost layers:
//! their `remaining_quantity` is the part of the layer not yet drawn by later issues.
//! Negative entries are draws; their `remaining_quantity` snapshots the balance left in
//! the layer they drew from.
//!
//! Allocation is pure: [`plan_receipt`] and [`plan_issue`] look at a snapshot of a
//! position's entries and say what to write. Storage applies the plan.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    DomainError, DomainResult, Entity, LedgerEntryId, PositionId, Quantity, StockId, UnitCost,
};

/// One immutable-ish row of the movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub position_id: PositionId,
    pub stock_id: StockId,
    pub quantity_change: Quantity,
    pub unit_cost: UnitCost,
    pub notes: String,
    pub job_ticket: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub remaining_quantity: Quantity,
}

impl Entity for LedgerEntry {
    type Id = LedgerEntryId;
    const KIND: &'static str = "ledger entry";

    fn id(&self) -> LedgerEntryId {
        self.id
    }
}

impl LedgerEntry {
    /// Positive entries are cost layers.
    pub fn is_layer(&self) -> bool {
        self.quantity_change > 0
    }

    pub fn is_draw(&self) -> bool {
        self.quantity_change < 0
    }
}

/// The two ways an existing layer may change after insertion.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerAmendment {
    /// A same-cost receipt grows the layer and refreshes its timestamp.
    Merge {
        quantity: Quantity,
        at: DateTime<Utc>,
    },
    /// An issue draws units out of the layer. The timestamp is left alone.
    Draw { quantity: Quantity },
}

impl LayerAmendment {
    /// Apply to `layer`, leaving it untouched on error.
    pub fn apply(self, layer: &mut LedgerEntry) -> DomainResult<()> {
        if !layer.is_layer() {
            return Err(DomainError::invariant(format!(
                "ledger entry {} is a draw, not a cost layer",
                layer.id
            )));
        }
        match self {
            LayerAmendment::Merge { quantity, at } => {
                let (Some(change), Some(remaining)) = (
                    layer.quantity_change.checked_add(quantity),
                    layer.remaining_quantity.checked_add(quantity),
                ) else {
                    return Err(DomainError::validation(format!(
                        "merging {quantity} into layer {} overflows its quantity",
                        layer.id
                    )));
                };
                layer.quantity_change = change;
                layer.remaining_quantity = remaining;
                layer.updated_at = at;
            }
            LayerAmendment::Draw { quantity } => {
                if quantity > layer.remaining_quantity {
                    return Err(DomainError::invariant(format!(
                        "draw of {quantity} exceeds the {} left in layer {}",
                        layer.remaining_quantity, layer.id
                    )));
                }
                layer.remaining_quantity -= quantity;
            }
        }
        Ok(())
    }
}

/// A ledger row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub position_id: PositionId,
    pub stock_id: StockId,
    pub quantity_change: Quantity,
    pub unit_cost: UnitCost,
    pub notes: String,
    pub job_ticket: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub remaining_quantity: Quantity,
}

impl NewLedgerEntry {
    pub fn into_entry(self, id: LedgerEntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            position_id: self.position_id,
            stock_id: self.stock_id,
            quantity_change: self.quantity_change,
            unit_cost: self.unit_cost,
            notes: self.notes,
            job_ticket: self.job_ticket,
            updated_at: self.updated_at,
            remaining_quantity: self.remaining_quantity,
        }
    }
}

/// A signed movement to record against a position.
///
/// `unit_cost` only matters for receipts; issues take the cost of the layers they draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub position_id: PositionId,
    pub stock_id: StockId,
    pub quantity_delta: Quantity,
    pub unit_cost: UnitCost,
    pub notes: String,
    pub job_ticket: Option<String>,
    pub at: DateTime<Utc>,
    /// Destination of a move. Every draw is mirrored as a receipt there at the same cost.
    pub move_target: Option<PositionId>,
}

impl Posting {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity_delta == 0 {
            return Err(DomainError::validation("ledger posting of zero quantity"));
        }
        if self.quantity_delta > 0 && self.move_target.is_some() {
            return Err(DomainError::validation(
                "a move target is only valid on an issue",
            ));
        }
        if self.move_target == Some(self.position_id) {
            return Err(DomainError::validation("cannot move a position onto itself"));
        }
        Ok(())
    }

    /// A fresh layer for a receipt that found nothing to merge into.
    pub fn new_layer(&self) -> NewLedgerEntry {
        NewLedgerEntry {
            position_id: self.position_id,
            stock_id: self.stock_id.clone(),
            quantity_change: self.quantity_delta,
            unit_cost: self.unit_cost,
            notes: self.notes.clone(),
            job_ticket: self.job_ticket.clone(),
            updated_at: self.at,
            remaining_quantity: self.quantity_delta,
        }
    }

    /// The negative row recording `draw`.
    pub fn deduction(&self, draw: &LayerDraw) -> NewLedgerEntry {
        NewLedgerEntry {
            position_id: self.position_id,
            stock_id: self.stock_id.clone(),
            quantity_change: -draw.quantity,
            unit_cost: draw.unit_cost,
            notes: self.notes.clone(),
            job_ticket: self.job_ticket.clone(),
            updated_at: self.at,
            remaining_quantity: draw.remaining_after,
        }
    }

    /// The receipt mirroring `draw` at the move target, if there is one.
    pub fn mirrored_receipt(&self, draw: &LayerDraw) -> Option<Posting> {
        self.move_target.map(|target| Posting {
            position_id: target,
            stock_id: self.stock_id.clone(),
            quantity_delta: draw.quantity,
            unit_cost: draw.unit_cost,
            notes: self.notes.clone(),
            job_ticket: self.job_ticket.clone(),
            at: self.at,
            move_target: None,
        })
    }
}

/// What a receipt does to the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReceiptPlan {
    /// Grow the existing same-cost layer.
    Merge { layer_id: LedgerEntryId },
    /// Start a new layer.
    Append,
}

/// Units taken from one layer by an issue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDraw {
    pub layer_id: LedgerEntryId,
    pub unit_cost: UnitCost,
    pub quantity: Quantity,
    /// Layer balance after this draw.
    pub remaining_after: Quantity,
}

impl LayerDraw {
    pub fn amendment(&self) -> LayerAmendment {
        LayerAmendment::Draw {
            quantity: self.quantity,
        }
    }
}

/// Decide where a receipt at `unit_cost` goes.
///
/// Same-cost receipts merge into the most recent positive entry with exactly that cost.
pub fn plan_receipt(snapshot: &[LedgerEntry], stock_id: &StockId, unit_cost: UnitCost) -> ReceiptPlan {
    snapshot
        .iter()
        .filter(|e| e.is_layer() && &e.stock_id == stock_id && e.unit_cost == unit_cost)
        .max_by_key(|e| e.id)
        .map_or(ReceiptPlan::Append, |layer| ReceiptPlan::Merge { layer_id: layer.id })
}

/// Attribute an issue of `quantity` units to cost layers.
///
/// Keeps drawing from the layer most recently drawn from (the newest draw whose cost is
/// not exhausted) and otherwise falls back to the oldest layer that still has units.
/// Drained costs are never revisited within one issue. Fails with
/// [`DomainError::NoAvailableLayer`] when the layers run out before the issue is covered.
pub fn plan_issue(
    snapshot: &[LedgerEntry],
    stock_id: &StockId,
    quantity: Quantity,
) -> DomainResult<Vec<LayerDraw>> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "issue quantity must be positive, got {quantity}"
        )));
    }

    let mut entries: Vec<&LedgerEntry> = snapshot
        .iter()
        .filter(|e| &e.stock_id == stock_id)
        .collect();
    entries.sort_by_key(|e| e.id);

    let mut balances: BTreeMap<LedgerEntryId, Quantity> = entries
        .iter()
        .filter(|e| e.is_layer())
        .map(|e| (e.id, e.remaining_quantity.max(0)))
        .collect();
    let mut exhausted: BTreeSet<UnitCost> = BTreeSet::new();
    let mut to_remove = quantity;
    let mut draws = Vec::new();

    while to_remove > 0 {
        let Some(layer) = select_layer(&entries, &balances, &mut exhausted) else {
            return Err(DomainError::NoAvailableLayer {
                stock_id: stock_id.to_string(),
                unallocated: to_remove,
            });
        };

        let available = balances.get(&layer.id).copied().unwrap_or(0);
        let take = available.min(to_remove);
        let remaining_after = available - take;
        balances.insert(layer.id, remaining_after);
        if remaining_after == 0 {
            exhausted.insert(layer.unit_cost);
        }

        draws.push(LayerDraw {
            layer_id: layer.id,
            unit_cost: layer.unit_cost,
            quantity: take,
            remaining_after,
        });
        to_remove -= take;
    }

    Ok(draws)
}

fn select_layer<'a>(
    entries: &[&'a LedgerEntry],
    balances: &BTreeMap<LedgerEntryId, Quantity>,
    exhausted: &mut BTreeSet<UnitCost>,
) -> Option<&'a LedgerEntry> {
    loop {
        let current = entries
            .iter()
            .rev()
            .find(|e| e.is_draw() && !exhausted.contains(&e.unit_cost));
        let cost = match current {
            Some(draw) => draw.unit_cost,
            None => {
                entries
                    .iter()
                    .find(|e| e.is_layer() && !exhausted.contains(&e.unit_cost))?
                    .unit_cost
            }
        };

        // Each pass either returns or exhausts one more cost, so this terminates.
        match open_layer(entries, balances, cost) {
            Some(layer) => return Some(layer),
            None => {
                exhausted.insert(cost);
            }
        }
    }
}

/// Oldest layer at `cost` that still holds units.
fn open_layer<'a>(
    entries: &[&'a LedgerEntry],
    balances: &BTreeMap<LedgerEntryId, Quantity>,
    cost: UnitCost,
) -> Option<&'a LedgerEntry> {
    entries
        .iter()
        .copied()
        .filter(|e| e.is_layer() && e.unit_cost == cost)
        .find(|e| balances.get(&e.id).copied().unwrap_or(0) > 0)
}


#[cfg(test)]
mod tests {
    use super::test_support::Book;
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn drawn(draws: &[LayerDraw]) -> Vec<(Quantity, UnitCost)> {
        draws.iter().map(|d| (d.quantity, d.unit_cost)).collect()
    }

    #[test]
    fn issue_consumes_oldest_layer_first() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        book.receive(5, dec!(2));

        let draws = book.issue(12).unwrap();

        assert_eq!(drawn(&draws), vec![(10, dec!(1)), (2, dec!(2))]);
        assert_eq!(draws[0].remaining_after, 0);
        assert_eq!(draws[1].remaining_after, 3);
        assert_eq!(book.open_layers(), vec![(dec!(2), 3)]);
        assert_eq!(book.balance(), 3);
    }

    #[test]
    fn same_cost_receipts_share_one_layer() {
        let mut book = Book::default();
        book.receive(5, dec!(1));
        book.receive(5, dec!(1.00));

        let layers: Vec<_> = book.entries.iter().filter(|e| e.is_layer()).collect();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].quantity_change, 10);
        assert_eq!(layers[0].remaining_quantity, 10);
    }

    #[test]
    fn different_cost_receipt_starts_a_new_layer() {
        let mut book = Book::default();
        book.receive(5, dec!(1));
        assert_eq!(
            plan_receipt(&book.entries, &Book::stock(), dec!(1.5)),
            ReceiptPlan::Append
        );
    }

    #[test]
    fn partial_draws_keep_working_the_current_layer() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        book.receive(10, dec!(2));

        book.issue(4).unwrap();
        let second = book.issue(4).unwrap();
        assert_eq!(drawn(&second), vec![(4, dec!(1))]);
        assert_eq!(second[0].remaining_after, 2);

        let third = book.issue(5).unwrap();
        assert_eq!(drawn(&third), vec![(2, dec!(1)), (3, dec!(2))]);
        assert_eq!(book.open_layers(), vec![(dec!(2), 7)]);
    }

    #[test]
    fn merged_receipt_into_a_partly_drawn_layer_is_drawn_first() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        book.issue(3).unwrap();
        book.receive(5, dec!(2));
        book.receive(4, dec!(1));

        let draws = book.issue(12).unwrap();

        assert_eq!(drawn(&draws), vec![(11, dec!(1)), (1, dec!(2))]);
        assert_eq!(book.balance(), 4);
        assert_eq!(book.open_layers(), vec![(dec!(2), 4)]);
    }

    #[test]
    fn running_out_of_layers_is_an_integrity_failure() {
        let mut book = Book::default();
        book.receive(3, dec!(1));

        let err = book.issue(5).unwrap_err();

        assert_eq!(
            err,
            DomainError::NoAvailableLayer {
                stock_id: "CARD-100".into(),
                unallocated: 2,
            }
        );
        assert!(err.is_integrity_violation());
    }

    #[test]
    fn empty_ledger_has_no_layer() {
        assert!(matches!(
            plan_issue(&[], &Book::stock(), 1),
            Err(DomainError::NoAvailableLayer { unallocated: 1, .. })
        ));
    }

    #[test]
    fn non_positive_issue_is_a_validation_error() {
        assert!(matches!(
            plan_issue(&[], &Book::stock(), 0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn entries_of_other_stock_are_ignored() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        let other = StockId::new("ENV-1").unwrap();
        assert!(plan_issue(&book.entries, &other, 1).is_err());
        assert_eq!(
            plan_receipt(&book.entries, &other, dec!(1)),
            ReceiptPlan::Append
        );
    }

    #[test]
    fn amendments_only_touch_cost_layers() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        book.issue(4).unwrap();

        let mut draw = book.entries[1].clone();
        assert!(draw.is_draw());
        assert!(LayerAmendment::Draw { quantity: 1 }.apply(&mut draw).is_err());

        let mut layer = book.entries[0].clone();
        let before = layer.updated_at;
        assert!(LayerAmendment::Draw { quantity: 7 }.apply(&mut layer).is_err());
        assert_eq!(layer.remaining_quantity, 6);
        LayerAmendment::Draw { quantity: 6 }.apply(&mut layer).unwrap();
        assert_eq!(layer.remaining_quantity, 0);
        assert_eq!(layer.updated_at, before);

        let later = Utc::now();
        LayerAmendment::Merge { quantity: 5, at: later }
            .apply(&mut layer)
            .unwrap();
        assert_eq!((layer.quantity_change, layer.remaining_quantity), (15, 5));
        assert_eq!(layer.updated_at, later);
    }

    #[test]
    fn overflowing_merge_leaves_the_layer_untouched() {
        let mut book = Book::default();
        book.receive(5_000_000_000_000_000_000, dec!(1));
        let mut layer = book.entries[0].clone();
        let untouched = layer.clone();

        let err = LayerAmendment::Merge {
            quantity: 5_000_000_000_000_000_000,
            at: Utc::now(),
        }
        .apply(&mut layer)
        .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(layer, untouched);
    }

    #[test]
    fn posting_rejects_zero_and_self_moves() {
        let mut book_posting = Posting {
            position_id: PositionId::new(1),
            stock_id: Book::stock(),
            quantity_delta: 0,
            unit_cost: dec!(1),
            notes: String::new(),
            job_ticket: None,
            at: Utc::now(),
            move_target: None,
        };
        assert!(book_posting.validate().is_err());

        book_posting.quantity_delta = -1;
        book_posting.move_target = Some(PositionId::new(1));
        assert!(book_posting.validate().is_err());

        book_posting.move_target = Some(PositionId::new(2));
        assert!(book_posting.validate().is_ok());

        book_posting.quantity_delta = 1;
        assert!(book_posting.validate().is_err());
    }

    #[test]
    fn mirrored_receipt_carries_the_layer_cost() {
        let posting = Posting {
            position_id: PositionId::new(1),
            stock_id: Book::stock(),
            quantity_delta: -4,
            unit_cost: dec!(0),
            notes: "to B".into(),
            job_ticket: None,
            at: Utc::now(),
            move_target: Some(PositionId::new(2)),
        };
        let draw = LayerDraw {
            layer_id: LedgerEntryId::new(1),
            unit_cost: dec!(2.5),
            quantity: 4,
            remaining_after: 1,
        };
        let receipt = posting.mirrored_receipt(&draw).unwrap();
        assert_eq!(receipt.position_id, PositionId::new(2));
        assert_eq!(receipt.quantity_delta, 4);
        assert_eq!(receipt.unit_cost, dec!(2.5));
        assert!(receipt.move_target.is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Receive(Quantity, u8),
        Issue(Quantity),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50, 1u8..5).prop_map(|(q, c)| Op::Receive(q, c)),
            (1i64..60).prop_map(Op::Issue),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn layers_always_account_for_the_balance(ops in proptest::collection::vec(op(), 1..40)) {
            let mut book = Book::default();
            for op in ops {
                match op {
                    Op::Receive(q, c) => book.receive(q, UnitCost::from(c)),
                    Op::Issue(q) => {
                        let before = book.balance();
                        match book.issue(q) {
                            Ok(draws) => {
                                prop_assert!(q <= before);
                                prop_assert_eq!(draws.iter().map(|d| d.quantity).sum::<Quantity>(), q);
                                prop_assert!(draws.iter().all(|d| d.quantity > 0));
                            }
                            Err(DomainError::NoAvailableLayer { .. }) => prop_assert!(q > before),
                            Err(other) => prop_assert!(false, "unexpected error: {other}"),
                        }
                    }
                }

                let open: Quantity = book.open_layers().iter().map(|(_, q)| q).sum();
                prop_assert_eq!(open, book.balance());
                prop_assert!(book.entries.iter().all(|e| e.remaining_quantity >= 0));
                prop_assert!(book
                    .entries
                    .iter()
                    .filter(|e| e.is_layer())
                    .all(|e| e.remaining_quantity <= e.quantity_change));
            }
        }
    }
}
