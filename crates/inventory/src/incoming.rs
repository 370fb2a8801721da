//! Staged receipts waiting to be put away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    CustomerId, DomainError, DomainResult, Entity, IncomingId, LocationId, MAX_QUANTITY,
    Quantity, StockId, UnitCost, validate_unit_cost,
};

use crate::material::{MaterialType, NewPosition, ReorderThresholds};

/// A pending receipt. Consumed exactly once by a Receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRecord {
    pub id: IncomingId,
    pub customer_id: CustomerId,
    pub stock_id: StockId,
    pub material_type: MaterialType,
    pub quantity: Quantity,
    pub unit_cost: UnitCost,
    pub thresholds: ReorderThresholds,
    pub notes: String,
    pub is_active: bool,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for IncomingRecord {
    type Id = IncomingId;
    const KIND: &'static str = "incoming material";

    fn id(&self) -> IncomingId {
        self.id
    }
}

impl IncomingRecord {
    /// Attributes of the position this record lands in at `location_id`.
    ///
    /// The staged notes become the position description.
    pub fn position_at(&self, location_id: LocationId, notes: &str) -> NewPosition {
        NewPosition {
            stock_id: self.stock_id.clone(),
            location_id,
            customer_id: self.customer_id,
            owner: self.owner.clone(),
            material_type: self.material_type,
            description: self.notes.clone(),
            notes: notes.to_string(),
            unit_cost: self.unit_cost,
            thresholds: self.thresholds,
            is_active: self.is_active,
        }
    }
}

/// Input for staging a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncoming {
    pub customer_id: CustomerId,
    pub stock_id: StockId,
    pub material_type: MaterialType,
    pub quantity: Quantity,
    pub unit_cost: UnitCost,
    pub thresholds: ReorderThresholds,
    pub notes: String,
    pub is_active: bool,
    pub owner: String,
}

impl NewIncoming {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "incoming quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.quantity > MAX_QUANTITY {
            return Err(DomainError::validation(format!(
                "incoming quantity {} exceeds {MAX_QUANTITY}",
                self.quantity
            )));
        }
        validate_unit_cost(self.unit_cost)?;
        if self.owner.trim().is_empty() {
            return Err(DomainError::validation("owner cannot be empty"));
        }
        Ok(())
    }

    pub fn into_record(self, id: IncomingId, at: DateTime<Utc>) -> IncomingRecord {
        IncomingRecord {
            id,
            customer_id: self.customer_id,
            stock_id: self.stock_id,
            material_type: self.material_type,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            thresholds: self.thresholds,
            notes: self.notes,
            is_active: self.is_active,
            owner: self.owner,
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn staged(quantity: Quantity) -> NewIncoming {
        NewIncoming {
            customer_id: CustomerId::new(3),
            stock_id: StockId::new("ENV-9").unwrap(),
            material_type: MaterialType::Envelope,
            quantity,
            unit_cost: dec!(0.25),
            thresholds: ReorderThresholds::default(),
            notes: "#10 window".into(),
            is_active: true,
            owner: "globex".into(),
        }
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(staged(0).validate().is_err());
        assert!(staged(-4).validate().is_err());
        assert!(staged(1).validate().is_ok());
    }

    #[test]
    fn negative_cost_is_rejected() {
        let mut input = staged(5);
        input.unit_cost = dec!(-1);
        assert!(matches!(input.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn oversized_receipts_are_rejected() {
        let mut input = staged(MAX_QUANTITY + 1);
        assert!(matches!(input.validate(), Err(DomainError::Validation(_))));

        input.quantity = MAX_QUANTITY;
        assert!(input.validate().is_ok());

        input.unit_cost = dec!(10000000000000);
        assert!(matches!(input.validate(), Err(DomainError::Validation(_))));

        input.unit_cost = dec!(0.1234567);
        assert!(matches!(input.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn staged_notes_become_position_description() {
        let record = staged(5).into_record(IncomingId::new(1), Utc::now());
        let new = record.position_at(LocationId::new(4), "dock 2");
        assert_eq!(new.description, "#10 window");
        assert_eq!(new.notes, "dock 2");
        assert_eq!(new.location_id, LocationId::new(4));
        assert_eq!(new.owner, "globex");
    }
}
