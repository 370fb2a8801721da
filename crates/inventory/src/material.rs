//! Material positions: the current-quantity projection over the ledger.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    CustomerId, DomainError, DomainResult, Entity, LocationId, PositionId, Quantity, StockId,
    UnitCost,
};

/// Kinds of material the warehouse stores.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    Card,
    Envelope,
}

impl MaterialType {
    pub const ALL: [MaterialType; 2] = [MaterialType::Card, MaterialType::Envelope];

    pub fn as_str(self) -> &'static str {
        match self {
            MaterialType::Card => "Card",
            MaterialType::Envelope => "Envelope",
        }
    }
}

impl core::fmt::Display for MaterialType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            t if t.eq_ignore_ascii_case("card") => Ok(MaterialType::Card),
            t if t.eq_ignore_ascii_case("envelope") => Ok(MaterialType::Envelope),
            other => Err(DomainError::validation(format!(
                "unknown material type: {other}"
            ))),
        }
    }
}

/// Reorder thresholds carried with a position. Informational only.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderThresholds {
    pub min: Quantity,
    pub max: Quantity,
}

impl ReorderThresholds {
    pub fn new(min: Quantity, max: Quantity) -> DomainResult<Self> {
        if min < 0 || max < 0 {
            return Err(DomainError::validation("thresholds cannot be negative"));
        }
        if max != 0 && min > max {
            return Err(DomainError::validation(format!(
                "min required quantity ({min}) exceeds max ({max})"
            )));
        }
        Ok(Self { min, max })
    }
}

/// Natural key of a position: one row per stock, location and owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub stock_id: StockId,
    pub location_id: LocationId,
    pub owner: String,
}

/// Current holding of one stock at one location for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPosition {
    pub id: PositionId,
    pub stock_id: StockId,
    pub location_id: LocationId,
    pub customer_id: CustomerId,
    pub owner: String,
    pub material_type: MaterialType,
    pub description: String,
    pub notes: String,
    pub quantity: Quantity,
    /// Last known unit cost. The ledger is authoritative for valuation.
    pub unit_cost: UnitCost,
    pub thresholds: ReorderThresholds,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Entity for MaterialPosition {
    type Id = PositionId;
    const KIND: &'static str = "material position";

    fn id(&self) -> PositionId {
        self.id
    }
}

impl MaterialPosition {
    pub fn key(&self) -> PositionKey {
        PositionKey {
            stock_id: self.stock_id.clone(),
            location_id: self.location_id,
            owner: self.owner.clone(),
        }
    }

    /// Quantity after applying `delta`, rejecting anything that would go negative.
    pub fn quantity_after(&self, delta: Quantity) -> DomainResult<Quantity> {
        let next = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if next < 0 {
            return Err(DomainError::insufficient(-delta, self.quantity));
        }
        Ok(next)
    }

    /// Apply a signed delta in place. Leaves the position untouched on error.
    pub fn apply_delta(
        &mut self,
        delta: Quantity,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.quantity = self.quantity_after(delta)?;
        if let Some(notes) = notes {
            self.notes = notes.to_string();
        }
        self.updated_at = at;
        Ok(())
    }

    /// Attributes for a sibling position of the same material at another location.
    pub fn relocated(&self, location_id: LocationId) -> NewPosition {
        NewPosition {
            stock_id: self.stock_id.clone(),
            location_id,
            customer_id: self.customer_id,
            owner: self.owner.clone(),
            material_type: self.material_type,
            description: self.description.clone(),
            notes: self.notes.clone(),
            unit_cost: self.unit_cost,
            thresholds: self.thresholds,
            is_active: self.is_active,
        }
    }
}

/// Attributes of a position that does not exist yet. Created at quantity 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPosition {
    pub stock_id: StockId,
    pub location_id: LocationId,
    pub customer_id: CustomerId,
    pub owner: String,
    pub material_type: MaterialType,
    pub description: String,
    pub notes: String,
    pub unit_cost: UnitCost,
    pub thresholds: ReorderThresholds,
    pub is_active: bool,
}

impl NewPosition {
    pub fn key(&self) -> PositionKey {
        PositionKey {
            stock_id: self.stock_id.clone(),
            location_id: self.location_id,
            owner: self.owner.clone(),
        }
    }

    pub fn into_position(self, id: PositionId, at: DateTime<Utc>) -> MaterialPosition {
        MaterialPosition {
            id,
            stock_id: self.stock_id,
            location_id: self.location_id,
            customer_id: self.customer_id,
            owner: self.owner,
            material_type: self.material_type,
            description: self.description,
            notes: self.notes,
            quantity: 0,
            unit_cost: self.unit_cost,
            thresholds: self.thresholds,
            is_active: self.is_active,
            updated_at: at,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn position(id: i64, quantity: Quantity) -> MaterialPosition {
        MaterialPosition {
            id: PositionId::new(id),
            stock_id: StockId::new("CARD-100").unwrap(),
            location_id: LocationId::new(1),
            customer_id: CustomerId::new(9),
            owner: "acme".into(),
            material_type: MaterialType::Card,
            description: "blank cards".into(),
            notes: String::new(),
            quantity,
            unit_cost: dec!(1),
            thresholds: ReorderThresholds::default(),
            is_active: true,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::position;
    use super::*;

    #[test]
    fn material_types_parse_case_insensitively() {
        assert_eq!("card".parse::<MaterialType>().unwrap(), MaterialType::Card);
        assert_eq!(
            " Envelope ".parse::<MaterialType>().unwrap(),
            MaterialType::Envelope
        );
        assert!("label".parse::<MaterialType>().is_err());
    }

    #[test]
    fn delta_that_would_go_negative_is_rejected_without_change() {
        let mut pos = position(1, 5);
        let err = pos.apply_delta(-6, Some("x"), Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::insufficient(6, 5));
        assert_eq!(pos.quantity, 5);
        assert_eq!(pos.notes, "");
    }

    #[test]
    fn delta_down_to_zero_is_allowed() {
        let mut pos = position(1, 5);
        pos.apply_delta(-5, None, Utc::now()).unwrap();
        assert_eq!(pos.quantity, 0);
    }

    #[test]
    fn relocated_keeps_everything_but_location() {
        let pos = position(1, 5);
        let sibling = pos.relocated(LocationId::new(2));
        assert_eq!(sibling.location_id, LocationId::new(2));
        assert_eq!(sibling.stock_id, pos.stock_id);
        assert_eq!(sibling.owner, pos.owner);
        assert_ne!(sibling.key(), pos.key());
    }

    #[test]
    fn thresholds_reject_inverted_bounds() {
        assert!(ReorderThresholds::new(10, 5).is_err());
        assert!(ReorderThresholds::new(5, 0).is_ok());
        assert!(ReorderThresholds::new(-1, 0).is_err());
    }
}
