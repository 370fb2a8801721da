//! Reconciliation of a position against its ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    DomainError, DomainResult, PositionId, Quantity, UnitCost, add_money, extended_cost,
};

use crate::layer::LedgerEntry;
use crate::material::MaterialPosition;

/// Open units of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLayer {
    pub unit_cost: UnitCost,
    pub remaining_quantity: Quantity,
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub position_id: PositionId,
    pub quantity: Quantity,
    pub open_layers: Vec<OpenLayer>,
    /// Sum of open units at their layer cost.
    pub value: Decimal,
}

/// Check that `entries` explain `position`.
///
/// The ledger must sum to the on-hand quantity, no remaining balance may be negative
/// or exceed its layer, and the open layers must hold exactly the on-hand units.
pub fn reconcile(position: &MaterialPosition, entries: &[LedgerEntry]) -> DomainResult<LedgerBalance> {
    let entries: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| e.position_id == position.id)
        .collect();

    let ledger_quantity: Quantity = entries.iter().map(|e| e.quantity_change).sum();
    if ledger_quantity != position.quantity {
        return Err(DomainError::invariant(format!(
            "position {} holds {} but its ledger sums to {}",
            position.id, position.quantity, ledger_quantity
        )));
    }

    if let Some(bad) = entries.iter().find(|e| {
        e.remaining_quantity < 0 || (e.is_layer() && e.remaining_quantity > e.quantity_change)
    }) {
        return Err(DomainError::invariant(format!(
            "ledger entry {} has remaining {} against a change of {}",
            bad.id, bad.remaining_quantity, bad.quantity_change
        )));
    }

    let open_layers: Vec<OpenLayer> = entries
        .iter()
        .filter(|e| e.is_layer() && e.remaining_quantity > 0)
        .map(|e| OpenLayer {
            unit_cost: e.unit_cost,
            remaining_quantity: e.remaining_quantity,
        })
        .collect();

    let open: Quantity = open_layers.iter().map(|l| l.remaining_quantity).sum();
    if open != position.quantity {
        return Err(DomainError::invariant(format!(
            "position {} holds {} but its open layers hold {}",
            position.id, position.quantity, open
        )));
    }

    let value = open_layers.iter().try_fold(Decimal::ZERO, |total, l| {
        add_money(total, extended_cost(l.remaining_quantity, l.unit_cost)?)
    })?;

    Ok(LedgerBalance {
        position_id: position.id,
        quantity: position.quantity,
        open_layers,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::test_support::Book;
    use crate::material::test_support::position;
    use rust_decimal_macros::dec;

    #[test]
    fn consistent_ledger_reconciles_with_value() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        book.receive(5, dec!(2));
        book.issue(12).unwrap();

        let balance = reconcile(&position(1, 3), &book.entries).unwrap();

        assert_eq!(balance.quantity, 3);
        assert_eq!(
            balance.open_layers,
            vec![OpenLayer {
                unit_cost: dec!(2),
                remaining_quantity: 3
            }]
        );
        assert_eq!(balance.value, dec!(6));
    }

    #[test]
    fn drifted_projection_is_reported() {
        let mut book = Book::default();
        book.receive(10, dec!(1));

        let err = reconcile(&position(1, 9), &book.entries).unwrap_err();

        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(err.is_integrity_violation());
    }

    #[test]
    fn overdrawn_layer_is_reported() {
        let mut book = Book::default();
        book.receive(10, dec!(1));
        book.entries[0].remaining_quantity = 11;

        assert!(reconcile(&position(1, 10), &book.entries).is_err());
    }

    #[test]
    fn unrepresentable_value_is_an_error() {
        let mut book = Book::default();
        book.receive(9_000_000_000_000_000_000, dec!(10000000000));

        let err = reconcile(&position(1, 9_000_000_000_000_000_000), &book.entries).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn empty_position_reconciles_to_zero() {
        let balance = reconcile(&position(1, 0), &[]).unwrap();
        assert!(balance.open_layers.is_empty());
        assert_eq!(balance.value, Decimal::ZERO);
    }
}
