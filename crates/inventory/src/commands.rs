//! Typed inputs of the lifecycle use cases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, IncomingId, LocationId, PositionId, Quantity};

/// Put a staged receipt away at a location. The whole staged quantity is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMaterial {
    pub incoming_id: IncomingId,
    pub location_id: LocationId,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Move part of a position to another location of the same owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveMaterial {
    pub position_id: PositionId,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Consume material from a position for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMaterial {
    pub position_id: PositionId,
    pub quantity: Quantity,
    pub job_ticket: String,
    /// Defaults to the position's current notes.
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

fn ensure_positive(quantity: Quantity, what: &str) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "{what} quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

impl MoveMaterial {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "moving")
    }
}

impl RemoveMaterial {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive(self.quantity, "removing")?;
        if self.job_ticket.trim().is_empty() {
            return Err(DomainError::validation("job ticket cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_needs_a_positive_quantity() {
        let cmd = MoveMaterial {
            position_id: PositionId::new(1),
            location_id: LocationId::new(2),
            quantity: 0,
            notes: String::new(),
            occurred_at: Utc::now(),
        };
        assert!(cmd.validate().is_err());
        assert!(MoveMaterial { quantity: 3, ..cmd }.validate().is_ok());
    }

    #[test]
    fn remove_needs_a_job_ticket() {
        let cmd = RemoveMaterial {
            position_id: PositionId::new(1),
            quantity: 2,
            job_ticket: "  ".into(),
            notes: None,
            occurred_at: Utc::now(),
        };
        assert!(matches!(cmd.validate(), Err(DomainError::Validation(_))));
    }
}
